/// BBC listing pages: weekly schedules, curated genre pages and per-show
/// episode lists.
///
/// All three share one shape. Repeating item containers are located with an
/// ordered list of structural selectors (the first selector that matches
/// anything wins), each container must yield a link and a title or it is
/// skipped, and the link is resolved and normalised before it becomes the
/// item's key.
pub mod episodes;
pub mod genre;
pub mod schedule;

use scraper::{ElementRef, Html, Selector};

use crate::{
    extract::{element_text, first_element, image_from_element},
    normalize::{absolutize, normalize_url},
};

/// A container selector, optionally requiring a descendant to be present.
pub(crate) struct ContainerRule {
    pub selector: &'static str,
    pub requires: Option<&'static str>,
}

impl ContainerRule {
    pub const fn any(selector: &'static str) -> Self {
        Self {
            selector,
            requires: None,
        }
    }

    pub const fn with(selector: &'static str, requires: &'static str) -> Self {
        Self {
            selector,
            requires: Some(requires),
        }
    }
}

/// Containers matched by the first rule that matches anything.
pub(crate) fn select_containers<'a>(doc: &'a Html, rules: &[ContainerRule]) -> Vec<ElementRef<'a>> {
    for rule in rules {
        let Ok(selector) = Selector::parse(rule.selector) else {
            continue;
        };
        let required = rule.requires.and_then(|r| Selector::parse(r).ok());

        let found: Vec<_> = doc
            .select(&selector)
            .filter(|el| match &required {
                Some(req) => el.select(req).next().is_some(),
                None => true,
            })
            .collect();

        if !found.is_empty() {
            tracing::trace!("container rule {:?} matched {} node(s)", rule.selector, found.len());
            return found;
        }
    }
    Vec::new()
}

/// Link element for a container: the container itself when it is an anchor,
/// otherwise the first match of `selectors` carrying an href.
pub(crate) fn container_link<'a>(container: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    if container.value().name() == "a" && container.value().attr("href").is_some() {
        return Some(container);
    }
    first_element(container, selectors).filter(|a| a.value().attr("href").is_some())
}

/// Absolute, normalised programme URL for an anchor. `None` for empty hrefs.
pub(crate) fn resolve_href(link: ElementRef<'_>) -> Option<String> {
    let href = link.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    Some(normalize_url(&absolutize(href)))
}

/// Title for a container: the dedicated title selectors first, the link
/// text last.
pub(crate) fn container_title(container: ElementRef<'_>, link: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    crate::extract::first_text(container, selectors)
        .or_else(|| Some(element_text(link)))
        .filter(|t| !t.is_empty())
}

/// First image inside a container.
pub(crate) fn container_image(container: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    first_element(container, selectors).and_then(image_from_element)
}
