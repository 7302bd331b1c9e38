/// Weekly schedule pages: `{schedule}/{year}/w{week}`.
///
/// Programmes on a week page carry no date of their own, so every item is
/// stamped with the Monday of the ISO week encoded in the page URL.
use std::collections::HashSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use scraper::Html;

use crate::{
    error::FetchError,
    extract::first_text,
    http::PageFetcher,
    listing::{ContainerRule, container_image, container_link, container_title, resolve_href},
    models::ProgrammeItem,
};

const CONTAINERS: &[ContainerRule] = &[
    ContainerRule::any("div.week-guide__table__item"),
    ContainerRule::any("li.grid.programme"),
    ContainerRule::any("div.programme"),
    ContainerRule::any("a[href*='/programmes/'], a[href*='/sounds/']"),
];

const LINKS: &[&str] = &[
    "a.br-blocklink__link",
    "a.programme__titles",
    "a[href*='/programmes/']",
    "a[href*='/sounds/']",
];

const TITLES: &[&str] = &[".programme__title", ".programme__titles"];

const SYNOPSES: &[&str] = &[".programme__synopsis", "p"];

const IMAGES: &[&str] = &[".programme__img img", "img"];

/// Week page URL for the ISO week containing `date`.
pub fn week_url(base: &str, date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}/{}/w{:02}", base.trim_end_matches('/'), week.year(), week.week())
}

/// One URL per calendar week from `since` up to and including the week of
/// `until`, in chronological order, without duplicates.
pub fn week_urls(base: &str, since: NaiveDate, until: NaiveDate) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();

    let mut current = since;
    while current <= until {
        let url = week_url(base, current);
        if seen.insert(url.clone()) {
            urls.push(url);
        }
        match current.checked_add_days(Days::new(7)) {
            Some(next) => current = next,
            None => break,
        }
    }

    // Stepping from `since` can jump past the week `until` falls in.
    let last = week_url(base, until);
    if since <= until && seen.insert(last.clone()) {
        urls.push(last);
    }

    urls
}

/// Monday of the ISO week encoded in a `…/{year}/w{week}` URL.
pub fn week_start_from_url(url: &str) -> Option<NaiveDate> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    let week: u32 = segments.next()?.strip_prefix(['w', 'W'])?.parse().ok()?;
    let year: i32 = segments.next()?.parse().ok()?;
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
}

/// Fetch one week page and return the programmes whose title contains
/// `filter` (case-insensitive).
pub async fn fetch_week(
    fetcher: &dyn PageFetcher,
    page_url: &str,
    filter: &str,
) -> Result<Vec<ProgrammeItem>, FetchError> {
    let html = fetcher.fetch(page_url).await?;
    Ok(parse_week(&html, page_url, filter))
}

pub fn parse_week(html: &str, page_url: &str, filter: &str) -> Vec<ProgrammeItem> {
    let doc = Html::parse_document(html);
    let week_start = week_start_from_url(page_url);
    let needle = filter.trim().to_lowercase();

    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for container in super::select_containers(&doc, CONTAINERS) {
        let Some(link) = container_link(container, LINKS) else {
            continue;
        };
        let Some(url) = resolve_href(link) else {
            continue;
        };
        let Some(title) = container_title(container, link, TITLES) else {
            continue;
        };
        if !title.to_lowercase().contains(&needle) {
            continue;
        }
        if !seen.insert(url.clone()) {
            continue;
        }

        let mut item = ProgrammeItem::new(title, &url);
        item.image_url = container_image(container, IMAGES);
        item.broadcast_date = week_start;
        let synopsis = first_text(container, SYNOPSES).filter(|s| *s != item.title);

        match week_start {
            Some(date) => {
                item.display_name = format!("{} ({})", item.title, date.format("%b %d, %Y"));
                item.description = synopsis
                    .unwrap_or_else(|| format!("Found in week of {}", date.format("%B %d, %Y")));
            }
            None => item.description = synopsis.unwrap_or_default(),
        }
        items.push(item);
    }

    tracing::debug!("{page_url}: {} item(s) matching {filter:?}", items.len());
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_url_uses_iso_week_year() {
        let base = "https://www.bbc.co.uk/schedules/p00fzl86";
        assert_eq!(week_url(base, date(2025, 7, 23)), format!("{base}/2025/w30"));
        // 2024-12-30 is in ISO week 1 of 2025.
        assert_eq!(week_url(base, date(2024, 12, 30)), format!("{base}/2025/w01"));
        // 2021-01-03 is in ISO week 53 of 2020.
        assert_eq!(week_url(&format!("{base}/"), date(2021, 1, 3)), format!("{base}/2020/w53"));
    }

    #[test]
    fn week_urls_cover_every_week_once() {
        let urls = week_urls("https://x/s", date(2025, 1, 1), date(2025, 3, 1));
        assert_eq!(urls.first().unwrap(), "https://x/s/2025/w01");
        assert_eq!(urls.last().unwrap(), "https://x/s/2025/w09");
        assert_eq!(urls.len(), 9);
        let unique: HashSet<_> = urls.iter().collect();
        assert_eq!(unique.len(), urls.len());
    }

    #[test]
    fn week_urls_include_the_final_partial_week() {
        // Wednesday to the Tuesday nine weeks later: stepping alone misses w10.
        let urls = week_urls("https://x/s", date(2025, 1, 1), date(2025, 3, 4));
        assert_eq!(urls.last().unwrap(), "https://x/s/2025/w10");
    }

    #[test]
    fn week_start_is_monday_of_iso_week() {
        assert_eq!(
            week_start_from_url("https://www.bbc.co.uk/schedules/p00fzl86/2025/w30"),
            Some(date(2025, 7, 21))
        );
        assert_eq!(week_start_from_url("https://x/s/2025/w01/"), Some(date(2024, 12, 30)));
        assert_eq!(week_start_from_url("https://x/s/2025/30"), None);
        assert_eq!(week_start_from_url("https://x/s/latest/w30"), None);
    }

    const WEEK: &str = r#"
        <html><body>
          <div class="week-guide__table__item">
            <div class="programme">
              <a class="br-blocklink__link" href="/programmes/m0021abc">
                <span class="programme__title">Friday Night Dance Party</span>
              </a>
              <p class="programme__synopsis">Three hours of club classics.</p>
              <img srcset="//ichef.bbci.co.uk/80/p1.jpg 80w, //ichef.bbci.co.uk/640/p1.jpg 640w">
            </div>
          </div>
          <div class="week-guide__table__item">
            <a class="br-blocklink__link" href="https://www.bbc.co.uk/programmes/M0021ABC/">
              <span class="programme__title">friday night dance party</span>
            </a>
          </div>
          <div class="week-guide__table__item">
            <a class="br-blocklink__link" href="/programmes/m0021def">Saturday Brunch</a>
          </div>
          <div class="week-guide__table__item">
            <span class="programme__title">Friday with no link</span>
          </div>
        </body></html>
    "#;

    #[test]
    fn parses_filters_and_dedups_a_week_page() {
        let items = parse_week(WEEK, "https://www.bbc.co.uk/schedules/p00fzl86/2025/w30", "FRIDAY");
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.title, "Friday Night Dance Party");
        assert_eq!(item.canonical_url, "https://www.bbc.co.uk/programmes/m0021abc");
        assert_eq!(item.broadcast_date, Some(date(2025, 7, 21)));
        assert_eq!(item.display_name, "Friday Night Dance Party (Jul 21, 2025)");
        assert_eq!(item.description, "Three hours of club classics.");
        assert_eq!(item.image_url.as_deref(), Some("https://ichef.bbci.co.uk/640/p1.jpg"));
    }

    #[test]
    fn falls_back_to_bare_programme_anchors() {
        let html = r#"<html><body>
            <a href="/programmes/m1">Friday Feeling</a>
            <a href="/sounds/play/m2">Friday Early Breakfast</a>
            <a href="/news">Friday news</a>
        </body></html>"#;
        let items = parse_week(html, "https://x/s/2025/w02", "friday");
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["Friday Feeling", "Friday Early Breakfast"]);
        assert_eq!(items[0].description, "Found in week of January 06, 2025");
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let items = parse_week(WEEK, "https://x/s/2025/w30", "");
        assert_eq!(items.len(), 2);
    }
}
