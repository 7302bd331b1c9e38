/// Programme detail pages, fetched for previews.
///
/// Preview is advisory: [`DetailFetcher::fetch_detail`] never fails, it folds
/// every error into a [`ProgrammeDetail`] with `has_error` set.
use std::sync::Arc;

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::{
    extract::{
        clean_text, element_text, first_attr, first_element, first_text, image_from_element, secure_image_url,
    },
    http::PageFetcher,
    models::ProgrammeDetail,
};

const TITLES: &[&str] = &["h1.hero__title", "h1.no-margin", "h1"];
const SUBTITLES: &[&str] = &["p.hero__subtitle", "h2.episode__subtitle"];
const DESCRIPTIONS: &[&str] = &[
    "div.episode-synopsis p",
    "div.synopsis p",
    "div.programme-synopsis p",
    "p.programme__synopsis",
];
const BRANDS: &[&str] = &["span.brand-title", "a.brand__title"];
const DURATIONS: &[&str] = &["span.duration", "[class*='duration']"];
const DATES: &[&str] = &["time", "span[class*='broadcast']", "[class*='date']"];
const IMAGES: &[&str] = &[
    "div.episode-playout img.image",
    "img.hero__image",
    "img.programme-image",
    "div.programme-image img",
    "img[alt*='programme']",
    "img[alt*='episode']",
];
const SHARE_IMAGES: &[&str] = &["meta[property='og:image']", "meta[name='twitter:image']"];
const GENRES: &str = "span[class*='genre'], a[class*='category']";
const JSON_LD: &str = r#"script[type="application/ld+json"]"#;

static RE_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d+\s+(?:minutes?|mins|hours?)\b").unwrap());

pub struct DetailFetcher {
    fetcher: Arc<dyn PageFetcher>,
}

impl DetailFetcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn fetch_detail(&self, url: &str) -> ProgrammeDetail {
        let url = url.trim();
        if url.is_empty() {
            return ProgrammeDetail::failed(url, "no programme URL given");
        }

        match self.fetcher.fetch(url).await {
            Ok(html) => parse_detail(&html, url),
            Err(e) => {
                tracing::warn!("Detail fetch for {url} failed: {e}");
                ProgrammeDetail::failed(url, e.to_string())
            }
        }
    }
}

pub fn parse_detail(html: &str, url: &str) -> ProgrammeDetail {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let mut detail = ProgrammeDetail {
        url: url.to_string(),
        title: first_text(root, TITLES).unwrap_or_default(),
        subtitle: first_text(root, SUBTITLES),
        description: first_text(root, DESCRIPTIONS),
        brand: first_text(root, BRANDS),
        duration: first_text(root, DURATIONS).or_else(|| duration_in_text(root)),
        image_url: first_element(root, IMAGES)
            .and_then(image_from_element)
            .or_else(|| first_attr(root, SHARE_IMAGES, "content").map(|u| secure_image_url(&u))),
        genres: genres(&doc),
        ..Default::default()
    };

    if let Some(date) = first_element(root, DATES) {
        let text = element_text(date);
        detail.broadcast_date = (!text.is_empty()).then_some(text);
        detail.broadcast_at = date
            .value()
            .attr("datetime")
            .and_then(|dt| DateTime::parse_from_rfc3339(dt.trim()).ok());
    }

    if let Some(data) = structured_data(&doc) {
        backfill(&mut detail, &data);
        detail.structured_data = Some(data);
    }

    detail
}

fn duration_in_text(root: ElementRef<'_>) -> Option<String> {
    root.text()
        .find_map(|chunk| RE_DURATION.find(chunk).map(|m| clean_text(m.as_str())))
}

fn genres(doc: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse(GENRES) else {
        return Vec::new();
    };
    let mut genres: Vec<String> = Vec::new();
    for genre in doc.select(&selector).map(element_text) {
        if !genre.is_empty() && !genres.contains(&genre) {
            genres.push(genre);
        }
    }
    genres
}

/// First JSON-LD block that parses.
fn structured_data(doc: &Html) -> Option<Value> {
    let selector = Selector::parse(JSON_LD).ok()?;
    doc.select(&selector).find_map(|script| {
        let raw = script.text().collect::<String>();
        serde_json::from_str::<Value>(raw.trim()).ok()
    })
}

fn ld_string(data: &Value, key: &str) -> Option<String> {
    let node = match data {
        Value::Array(nodes) => nodes.first()?,
        other => other,
    };
    let value = match node.get(key)? {
        Value::String(s) => Some(clean_text(s)),
        Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(clean_text),
        Value::Array(values) => values.iter().find_map(Value::as_str).map(clean_text),
        _ => None,
    };
    value.filter(|s| !s.is_empty())
}

fn backfill(detail: &mut ProgrammeDetail, data: &Value) {
    if detail.title.is_empty() {
        if let Some(name) = ld_string(data, "name") {
            detail.title = name;
        }
    }
    if detail.description.is_none() {
        detail.description = ld_string(data, "description");
    }
    if detail.image_url.is_none() {
        detail.image_url = ld_string(data, "image").map(|u| secure_image_url(&u));
    }
}
