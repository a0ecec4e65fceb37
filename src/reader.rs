//! Markdown capture via a reader service.
//!
//! HTML→Markdown conversion is delegated to a Jina-style reader: `GET
//! {base}/{page url}` returns the page rendered as markdown. The
//! reader reports an unreachable target inside an otherwise-200 body,
//! so that sentinel is surfaced as a fetch failure here.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

static TITLE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Title: (.*)").unwrap());

const NOT_FOUND_SENTINEL: &str = "Warning: Target URL returned error 404";

/// Fetch `page_url` through the reader service at `base_url`,
/// returning the page as markdown.
pub async fn fetch_markdown(
    client: &reqwest::Client,
    base_url: &str,
    page_url: &str,
) -> Result<String> {
    let reader_url = format!("{}/{}", base_url.trim_end_matches('/'), page_url);

    let response = client
        .get(&reader_url)
        .send()
        .await
        .with_context(|| format!("Failed to reach reader at {reader_url}"))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("Reader returned {status} for {page_url}");
    }

    let markdown = response
        .text()
        .await
        .with_context(|| format!("Failed to read reader body for {page_url}"))?;

    if markdown.contains(NOT_FOUND_SENTINEL) {
        anyhow::bail!("Reader target returned 404: {page_url}");
    }

    Ok(markdown)
}

/// Extract the title from reader markdown (`Title: ...` convention).
pub fn title_from_markdown(markdown: &str) -> Option<String> {
    TITLE_LINE
        .captures(markdown)
        .map(|cap| cap[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_line() {
        let md = "Title: Getting Started\nURL Source: https://x\n\n# Getting Started";
        assert_eq!(title_from_markdown(md).as_deref(), Some("Getting Started"));
    }

    #[test]
    fn missing_title_line_is_none() {
        assert_eq!(title_from_markdown("# Just a heading"), None);
    }
}
