//! Link harvesting — the fallback discovery strategy.
//!
//! Extracts same-domain anchor targets from a page's raw markup,
//! resolving relative paths against the page's own URL, stripping
//! fragment and query components, and excluding non-document resources
//! by extension. Used when sitemap discovery fails and for the
//! second-pass sweep over links found while scraping.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\(([^)\s]+)\)").unwrap());

/// File extensions that never hold documentation text.
const SKIP_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "css", "js", "mjs", "json", "xml", "pdf",
    "zip", "tar", "gz", "woff", "woff2", "ttf", "eot", "mp4", "webm", "csv",
];

/// Extract candidate document URLs from an HTML page.
///
/// `page_url` is the address the markup was fetched from; it anchors
/// relative hrefs and defines "same domain". Order follows document
/// order with duplicates removed.
pub fn harvest_html_links(html: &str, page_url: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for el in doc.select(&ANCHOR) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if let Some(normalized) = normalize_candidate(href, page_url) {
            if seen.insert(normalized.clone()) {
                out.push(normalized);
            }
        }
    }

    out
}

/// Extract candidate document URLs from markdown link syntax.
pub fn harvest_markdown_links(markdown: &str, page_url: &Url) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for cap in MD_LINK.captures_iter(markdown) {
        let target = &cap[1];
        if let Some(normalized) = normalize_candidate(target, page_url) {
            if seen.insert(normalized.clone()) {
                out.push(normalized);
            }
        }
    }

    out
}

/// Resolve, filter, and normalize one raw href. Returns `None` for
/// off-domain targets, non-http schemes, and non-document resources.
fn normalize_candidate(href: &str, page_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let mut resolved = page_url.join(href).ok()?;

    match resolved.scheme() {
        "http" | "https" => {}
        _ => return None,
    }

    if resolved.host_str() != page_url.host_str() {
        return None;
    }

    resolved.set_fragment(None);
    resolved.set_query(None);

    if let Some(ext) = extension_of(resolved.path()) {
        if SKIP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return None;
        }
    }

    Some(resolved.to_string())
}

fn extension_of(path: &str) -> Option<&str> {
    let last_segment = path.rsplit('/').next()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}
