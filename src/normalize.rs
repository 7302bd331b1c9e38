/// Canonical keys for BBC programme URLs.
///
/// Every discovered link goes through [`normalize_url`] so that deduplication
/// and "already downloaded" checks compare like with like.
use url::Url;

pub const CANONICAL_ORIGIN: &str = "https://www.bbc.co.uk";

/// Canonicalise a programme URL.
///
/// Absolute URLs are forced onto `https://www.bbc.co.uk`, lose their query and
/// fragment, their trailing slash, and are lower-cased. Input that does not
/// parse as an absolute URL is only trimmed and stripped of trailing slashes.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match Url::parse(trimmed) {
        Ok(url) if url.has_host() => {
            let path = url.path().trim_end_matches('/');
            format!("{CANONICAL_ORIGIN}{path}").to_lowercase()
        }
        _ => trimmed.trim_end_matches('/').to_string(),
    }
}

/// Turn an href found on a BBC page into an absolute URL.
pub fn absolutize(href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("{CANONICAL_ORIGIN}{href}")
    } else {
        format!("{CANONICAL_ORIGIN}/{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_host_slash_and_case_variants_collapse() {
        let variants = [
            "https://www.bbc.co.uk/programmes/m0021xyz",
            "http://www.bbc.co.uk/programmes/m0021xyz",
            "https://bbc.co.uk/programmes/m0021xyz/",
            "https://WWW.BBC.CO.UK/Programmes/M0021XYZ",
            "http://www.bbc.com/programmes/m0021xyz?foo=bar#top",
            "  https://www.bbc.co.uk/programmes/m0021xyz//  ",
        ];
        for v in variants {
            assert_eq!(
                normalize_url(v),
                "https://www.bbc.co.uk/programmes/m0021xyz",
                "variant {v:?}"
            );
        }
    }

    #[test]
    fn empty_and_whitespace_yield_empty() {
        assert_eq!(normalize_url(""), "");
        assert_eq!(normalize_url("   \t"), "");
    }

    #[test]
    fn relative_input_passes_through_trimmed() {
        assert_eq!(normalize_url(" /programmes/B006WKFP/ "), "/programmes/B006WKFP");
        assert_eq!(normalize_url("not a url"), "not a url");
    }

    #[test]
    fn root_url_has_no_trailing_slash() {
        assert_eq!(normalize_url("https://bbc.co.uk/"), "https://www.bbc.co.uk");
    }

    #[test]
    fn absolutize_handles_each_href_shape() {
        assert_eq!(
            absolutize("/programmes/b006wkfp"),
            "https://www.bbc.co.uk/programmes/b006wkfp"
        );
        assert_eq!(
            absolutize("//ichef.bbci.co.uk/images/ic/640x360/p0.jpg"),
            "https://ichef.bbci.co.uk/images/ic/640x360/p0.jpg"
        );
        assert_eq!(
            absolutize("programmes/b006wkfp"),
            "https://www.bbc.co.uk/programmes/b006wkfp"
        );
        assert_eq!(
            absolutize("https://www.bbc.co.uk/sounds/play/m1"),
            "https://www.bbc.co.uk/sounds/play/m1"
        );
    }
}
