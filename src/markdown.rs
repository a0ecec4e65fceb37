//! Markdown and HTML hygiene helpers for captured pages.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static HEADING_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s+.*$").unwrap());
static LINK_ONLY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[*+-]\s*)?\[.*?\]\(.*?\).*$").unwrap());

/// Strip navigation debris from converted markdown: any section whose
/// body consists solely of links (sidebars, footers, tables of
/// contents) is dropped along with its heading. Sections with at least
/// one non-link line survive intact.
pub fn clean_markdown(markdown: &str) -> String {
    fn flush<'a>(
        heading: Option<&'a str>,
        section: &mut Vec<&'a str>,
        keep: bool,
        out: &mut Vec<&'a str>,
    ) {
        if keep && !section.is_empty() {
            if let Some(h) = heading {
                out.push(h);
            }
            out.append(section);
        } else {
            section.clear();
        }
    }

    let mut cleaned: Vec<&str> = Vec::new();
    let mut current_heading: Option<&str> = None;
    let mut section: Vec<&str> = Vec::new();
    let mut has_non_links = false;

    for line in markdown.lines() {
        if HEADING_LINE.is_match(line) {
            flush(current_heading, &mut section, has_non_links, &mut cleaned);
            current_heading = Some(line);
            has_non_links = false;
            continue;
        }

        if line.trim().is_empty() {
            if !section.is_empty() {
                section.push(line);
            }
        } else {
            section.push(line);
            if !LINK_ONLY_LINE.is_match(line) {
                has_non_links = true;
            }
        }
    }
    flush(current_heading, &mut section, has_non_links, &mut cleaned);

    cleaned.join("\n")
}

/// Extract the `<head><title>` text of an HTML document, if present.
pub fn title_from_html(html: &str) -> Option<String> {
    static TITLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("head > title").unwrap());

    let doc = Html::parse_document(html);
    doc.select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}
