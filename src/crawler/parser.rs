//! HTML parser for extracting record links
//!
//! Discovery pages on the statistics site mark the anchors that matter with a
//! fixed structural feature: an href fragment (`event-details`) or a CSS
//! class (`b-flag_style_green`, `b-link`). A [`LinkMarker`] names that
//! feature and [`extract_links`] applies it to a page body.

use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

/// Errors raised while turning a page body into links
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("No '{marker}' links found on {url}")]
    NoLinks { url: String, marker: String },
}

/// Structural marker identifying the relevant anchors on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMarker {
    /// Every `<a>` whose href contains the fragment
    HrefContains(&'static str),

    /// Anchors matching a CSS selector, optionally every `step`-th match
    /// starting at index `start`
    Selector {
        css: &'static str,
        nth: Option<(usize, usize)>,
    },
}

impl LinkMarker {
    /// Event links on the completed-events listing
    pub const EVENT: LinkMarker = LinkMarker::HrefContains("event-details");

    /// Fight links on an event page
    pub const FIGHT: LinkMarker = LinkMarker::Selector {
        css: "a.b-flag.b-flag_style_green",
        nth: None,
    };

    /// Fighter links on an alphabetic fighter index page; every table row
    /// carries three `b-link` anchors and the second one is the profile
    pub const FIGHTER: LinkMarker = LinkMarker::Selector {
        css: "a.b-link",
        nth: Some((1, 3)),
    };
}

impl std::fmt::Display for LinkMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HrefContains(fragment) => write!(f, "href*={}", fragment),
            Self::Selector { css, nth: None } => write!(f, "{}", css),
            Self::Selector {
                css,
                nth: Some((start, step)),
            } => write!(f, "{}[{}::{}]", css, start, step),
        }
    }
}

/// Extracts the links a marker identifies, in document order
///
/// Relative hrefs are resolved against `base_url`. Links with non-HTTP
/// schemes and fragment-only links are dropped.
///
/// # Example
///
/// ```
/// use octagon_harvest::crawler::{extract_links, LinkMarker};
/// use url::Url;
///
/// let html = r#"<a href="/event-details/abc">UFC 1</a><a href="/about">About</a>"#;
/// let base = Url::parse("http://ufcstats.com/statistics/events/completed").unwrap();
/// let links = extract_links(html, &base, &LinkMarker::EVENT).unwrap();
/// assert_eq!(links, vec!["http://ufcstats.com/event-details/abc".to_string()]);
/// ```
pub fn extract_links(
    html: &str,
    base_url: &Url,
    marker: &LinkMarker,
) -> Result<Vec<String>, ParseError> {
    let document = Html::parse_document(html);

    let hrefs: Vec<&str> = match marker {
        LinkMarker::HrefContains(fragment) => {
            let selector = parse_selector("a[href]")?;
            document
                .select(&selector)
                .filter_map(|element| element.value().attr("href"))
                .filter(|href| href.contains(fragment))
                .collect()
        }
        LinkMarker::Selector { css, nth } => {
            let selector = parse_selector(css)?;
            let matches = document.select(&selector);
            let picked: Vec<_> = match nth {
                Some((start, step)) => matches.skip(*start).step_by((*step).max(1)).collect(),
                None => matches.collect(),
            };
            picked
                .into_iter()
                .filter_map(|element| element.value().attr("href"))
                .collect()
        }
    };

    Ok(hrefs
        .into_iter()
        .filter_map(|href| resolve_link(href, base_url))
        .collect())
}

fn parse_selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::InvalidSelector {
        selector: css.to_string(),
        message: format!("{:?}", e),
    })
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}
