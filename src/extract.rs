/// Field extraction primitives shared by every page parser.
///
/// Selector lists are ordered fallback chains: the BBC renders the same kind
/// of content with several templates, and earlier selectors belong to the
/// templates we trust most. The first selector that yields a non-empty value
/// wins and the rest are never evaluated.
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::normalize::CANONICAL_ORIGIN;

/// Decode HTML entities and collapse runs of whitespace.
pub fn clean_text(raw: &str) -> String {
    html_escape::decode_html_entities(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// All text beneath `el`, cleaned.
pub fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<String>())
}

/// Text of the first element matched by the first selector that produces
/// non-empty text.
pub fn first_text(scope: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        scope
            .select(&selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// Like [`first_text`] but reads `attr` from the matched element.
pub fn first_attr(scope: ElementRef<'_>, selectors: &[&str], attr: &str) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        scope
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .map(clean_text)
            .find(|value| !value.is_empty())
    })
}

/// First element matched by the first selector that matches anything.
pub fn first_element<'a>(scope: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        scope.select(&selector).next()
    })
}

// ── Images ────────────────────────────────────────────────────────────────────

/// Pick the widest candidate from a responsive `srcset` list.
///
/// Format: `url1 80w, url2 640w, …`. Entries without a parsable width are
/// ignored. On a tie the earlier candidate is kept.
pub fn best_image(srcset: &str) -> Option<String> {
    let mut best: Option<(&str, u32)> = None;

    for candidate in srcset.split(',') {
        let mut parts = candidate.split_whitespace();
        let (Some(url), Some(width)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(width) = width.trim_end_matches(['w', 'W']).parse::<u32>() else {
            continue;
        };
        if best.is_none_or(|(_, w)| width > w) {
            best = Some((url, width));
        }
    }

    best.map(|(url, _)| secure_image_url(url))
}

/// Make an image URL absolute on the secure scheme.
pub fn secure_image_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("https://") || url.starts_with("http://") {
        url.to_string()
    } else if url.starts_with("//") {
        format!("https:{url}")
    } else if url.starts_with('/') {
        format!("{CANONICAL_ORIGIN}{url}")
    } else {
        format!("https://{url}")
    }
}

/// Best image URL for an `<img>` element: widest `srcset` candidate, then
/// the lazy-load `data-src`, then `src`.
pub fn image_from_element(img: ElementRef<'_>) -> Option<String> {
    let attrs = img.value();
    if let Some(best) = attrs.attr("srcset").and_then(best_image) {
        return Some(best);
    }
    attrs
        .attr("data-src")
        .or_else(|| attrs.attr("src"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(secure_image_url)
}

// ── Broadcast dates ───────────────────────────────────────────────────────────

/// en-GB date shapes seen on BBC listings, day first.
const DATE_FORMATS: &[&str] = &[
    "%a %d %b %Y",
    "%A %d %B %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d/%m/%Y",
    "%Y-%m-%d",
];

/// Parse a broadcast date out of a free-text metadata line.
///
/// The whole (de-noised) line is tried first; failing that it is split on
/// the separators BBC pages use between metadata fields and each piece is
/// tried in order.
pub fn parse_broadcast_date(text: &str) -> Option<NaiveDate> {
    static RE_NOISE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)first broadcast:|available now").unwrap());
    static RE_ORDINAL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap());

    let cleaned = clean_text(text);
    let cleaned = RE_NOISE.replace_all(&cleaned, " ");
    let cleaned = RE_ORDINAL.replace_all(&cleaned, "$1").replace(',', " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    if let Some(date) = parse_date_token(&cleaned) {
        return Some(date);
    }

    cleaned
        .split(['•', '-', '|', '\n'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .find_map(parse_date_token)
}

fn parse_date_token(token: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_and_remainder(token, fmt).ok())
        .map(|(date, _rest)| date)
}
