//! Helpers for the loosely-formed HTML found in feed item bodies.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid img tag pattern"));

static IMG_SELECTOR: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("img[src]").ok());

/// Returns the `src` of the first `img` in document order, or an empty string.
///
/// The fragment is parsed with an HTML5 parser, so unclosed or stray tags and
/// missing root elements are tolerated.
pub fn first_image(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let Some(selector) = IMG_SELECTOR.as_ref() else {
        return String::new();
    };

    let fragment = Html::parse_fragment(html);
    fragment
        .select(selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

/// Removes only the first `<img ...>` tag.
pub fn strip_first_image(html: &str) -> String {
    IMG_TAG.replacen(html, 1, "").into_owned()
}

/// Plain text of an HTML fragment with entities decoded and whitespace collapsed.
pub fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
