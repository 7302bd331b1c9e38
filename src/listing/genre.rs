/// Curated genre page: a highlight list of shows, not episodes.
use std::collections::HashSet;

use scraper::Html;

use crate::{
    error::FetchError,
    extract::first_text,
    http::PageFetcher,
    listing::{ContainerRule, container_image, container_link, container_title, resolve_href},
    models::ProgrammeItem,
};

const CONTAINERS: &[ContainerRule] = &[
    ContainerRule::any("ol.highlight-box-wrapper div.programme"),
    ContainerRule::any("div.highlight-box div.programme"),
];

const LINKS: &[&str] = &["h2.programme__titles a"];

pub async fn fetch_shows(fetcher: &dyn PageFetcher, url: &str) -> Result<Vec<ProgrammeItem>, FetchError> {
    let html = fetcher.fetch(url).await?;
    Ok(parse_shows(&html))
}

/// Shows on a genre page, sorted by title. Genre shows carry no date.
pub fn parse_shows(html: &str) -> Vec<ProgrammeItem> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut shows = Vec::new();

    for container in super::select_containers(&doc, CONTAINERS) {
        let Some(link) = container_link(container, LINKS) else {
            continue;
        };
        let Some(title) = container_title(container, link, &[]) else {
            continue;
        };
        let Some(url) = resolve_href(link) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let synopsis = first_text(container, &["p.programme__synopsis"]).unwrap_or_default();
        let service = first_text(container, &["p.programme__service"]);

        let mut show = ProgrammeItem::new(title, &url);
        show.description = match service {
            Some(service) => format!("{service} • {synopsis}")
                .trim_matches([' ', '•'])
                .to_string(),
            None => synopsis,
        };
        show.image_url = container_image(container, &["div.programme__img img"]);
        shows.push(show);
    }

    shows.sort_by(|a, b| a.title.cmp(&b.title));
    shows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeFetcher;

    const GENRE: &str = r#"
        <html><body>
          <ol class="highlight-box-wrapper">
            <li><div class="programme programme--radio">
              <div class="programme__img"><img data-src="//ichef.bbci.co.uk/ess.jpg"></div>
              <h2 class="programme__titles"><a href="/programmes/b006wkfp">Radio 1's Essential Mix</a></h2>
              <p class="programme__service">Radio 1</p>
              <p class="programme__synopsis">The biggest DJs.</p>
            </div></li>
            <li><div class="programme">
              <h2 class="programme__titles"><a href="/programmes/b00xyz">Annie Mac</a></h2>
              <p class="programme__service">Radio 1</p>
            </div></li>
            <li><div class="programme">
              <h2 class="programme__titles"><a href="https://www.bbc.co.uk/programmes/B006WKFP/">Duplicate</a></h2>
            </div></li>
            <li><div class="programme">
              <h2 class="programme__titles">No link here</h2>
            </div></li>
          </ol>
        </body></html>
    "#;

    #[test]
    fn parses_sorted_unique_shows() {
        let shows = parse_shows(GENRE);
        let titles: Vec<_> = shows.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["Annie Mac", "Radio 1's Essential Mix"]);

        let essential = &shows[1];
        assert_eq!(essential.canonical_url, "https://www.bbc.co.uk/programmes/b006wkfp");
        assert_eq!(essential.description, "Radio 1 • The biggest DJs.");
        assert_eq!(essential.image_url.as_deref(), Some("https://ichef.bbci.co.uk/ess.jpg"));
        assert_eq!(essential.broadcast_date, None);

        assert_eq!(shows[0].description, "Radio 1");
        assert_eq!(shows[0].image_url, None);
    }

    #[test]
    fn page_without_highlights_is_empty() {
        assert!(parse_shows("<html><body><p>Nothing</p></body></html>").is_empty());
    }

    #[tokio::test]
    async fn fetches_configured_genre_url() {
        let url = "https://www.bbc.co.uk/programmes/genres/music/danceandelectronica/player";
        let fetcher = FakeFetcher::default().with_page(url, GENRE);
        let shows = fetch_shows(&fetcher, url).await.unwrap();
        assert_eq!(shows.len(), 2);
        assert_eq!(fetcher.requested.lock().unwrap().as_slice(), [url]);
    }
}
