/// Episode lists for a single show.
use std::collections::HashSet;

use scraper::Html;

use crate::{
    error::FetchError,
    extract::{element_text, first_text, parse_broadcast_date},
    http::PageFetcher,
    listing::{ContainerRule, container_image, container_link, resolve_href},
    models::ProgrammeItem,
    normalize::normalize_url,
};

const CONTAINERS: &[ContainerRule] = &[
    ContainerRule::any("div.programme--episode"),
    ContainerRule::with("li.programme", "a.programme__titles"),
    ContainerRule::any("div.episode-item"),
];

const LINKS: &[&str] = &["a.programme__titles", "a.br-blocklink__link", "a[href]"];

const DESCRIPTIONS: &[&str] = &["p.programme__synopsis", "p.text--description", "p"];

const META: &[&str] = &[
    "div.programme__meta",
    "div.episode-item__info__secondary",
    "ul.episode-item__meta",
];

/// Episode listing page for a show URL.
pub fn listing_url(show_url: &str) -> String {
    let show = normalize_url(show_url);
    if show.is_empty() || show.contains("/episodes") {
        return show;
    }
    format!("{}/episodes/player", show.trim_end_matches('/'))
}

pub async fn fetch_episodes(fetcher: &dyn PageFetcher, show_url: &str) -> Result<Vec<ProgrammeItem>, FetchError> {
    let url = listing_url(show_url);
    if url.is_empty() {
        return Ok(Vec::new());
    }
    let html = fetcher.fetch(&url).await?;
    Ok(parse_episodes(&html))
}

pub fn parse_episodes(html: &str) -> Vec<ProgrammeItem> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut episodes = Vec::new();

    for container in super::select_containers(&doc, CONTAINERS) {
        let Some(link) = container_link(container, LINKS) else {
            continue;
        };
        let Some(url) = resolve_href(link) else {
            continue;
        };
        let title = element_text(link);
        if title.is_empty() || !seen.insert(url.clone()) {
            continue;
        }

        let mut episode = ProgrammeItem::new(title, &url);
        episode.description = first_text(container, DESCRIPTIONS).unwrap_or_default();
        episode.image_url = container_image(container, &["img"]);
        episode.broadcast_date = first_text(container, META).and_then(|meta| parse_broadcast_date(&meta));
        if let Some(date) = episode.broadcast_date {
            episode.display_name = format!("{} ({})", episode.title, date.format("%d %b %Y"));
        }
        episodes.push(episode);
    }

    episodes
}
