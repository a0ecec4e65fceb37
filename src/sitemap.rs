//! Sitemap-based URL discovery — the primary discovery strategy.
//!
//! Fetches `<root>/sitemap.xml` and returns every page URL it lists.
//! A sitemap *index* is followed one level deep: each referenced
//! sitemap is fetched and their URL sets are unioned. A child sitemap
//! that fails to fetch or parse is dropped with a warning; only a
//! failure of the top-level sitemap itself propagates, which is what
//! triggers the caller's fallback to link harvesting.

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct UrlSet {
    #[serde(rename = "url", default)]
    urls: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize)]
struct UrlEntry {
    loc: String,
}

#[derive(Debug, Deserialize)]
struct SitemapIndex {
    #[serde(rename = "sitemap", default)]
    sitemaps: Vec<SitemapRef>,
}

#[derive(Debug, Deserialize)]
struct SitemapRef {
    loc: String,
}

/// Discover URLs for `root_url` via its sitemap.
pub async fn discover_from_sitemap(client: &reqwest::Client, root_url: &Url) -> Result<Vec<String>> {
    let sitemap_url = sitemap_location(root_url)?;
    tracing::info!(%sitemap_url, "fetching sitemap");

    let body = fetch_text(client, sitemap_url.as_str()).await?;

    if body.contains("<sitemapindex") {
        let index: SitemapIndex =
            quick_xml::de::from_str(&body).context("Failed to parse sitemap index")?;

        let mut urls = Vec::new();
        for sitemap in index.sitemaps {
            match fetch_url_set(client, &sitemap.loc).await {
                Ok(mut child) => urls.append(&mut child),
                Err(err) => {
                    tracing::warn!(sitemap = %sitemap.loc, error = %err, "skipping child sitemap");
                }
            }
        }
        Ok(urls)
    } else {
        parse_url_set(&body)
    }
}

/// `/sitemap.xml` at the root of the source's origin.
fn sitemap_location(root_url: &Url) -> Result<Url> {
    if root_url.host_str().is_none() {
        anyhow::bail!("Root URL has no host: {root_url}");
    }
    let mut location = root_url.clone();
    location.set_path("/sitemap.xml");
    location.set_query(None);
    location.set_fragment(None);
    Ok(location)
}

async fn fetch_url_set(client: &reqwest::Client, location: &str) -> Result<Vec<String>> {
    let body = fetch_text(client, location).await?;
    parse_url_set(&body)
}

fn parse_url_set(body: &str) -> Result<Vec<String>> {
    let set: UrlSet = quick_xml::de::from_str(body).context("Failed to parse sitemap")?;
    Ok(set.urls.into_iter().map(|u| u.loc).collect())
}

async fn fetch_text(client: &reqwest::Client, location: &str) -> Result<String> {
    let response = client
        .get(location)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {location}"))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("GET {location} returned {status}");
    }

    response
        .text()
        .await
        .with_context(|| format!("Failed to read body of {location}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_url_set() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://docs.example.com/a</loc><lastmod>2024-01-01</lastmod></url>
  <url><loc>https://docs.example.com/b</loc></url>
</urlset>"#;
        let urls = parse_url_set(xml).unwrap();
        assert_eq!(
            urls,
            vec!["https://docs.example.com/a", "https://docs.example.com/b"]
        );
    }

    #[test]
    fn empty_url_set_parses_to_no_urls() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"></urlset>"#;
        assert!(parse_url_set(xml).unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_url_set("<urlset><url><loc>x</loc>").is_err());
    }

    #[test]
    fn parses_sitemap_index_refs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://docs.example.com/sitemap-1.xml</loc></sitemap>
  <sitemap><loc>https://docs.example.com/sitemap-2.xml</loc><lastmod>2024-02-02</lastmod></sitemap>
</sitemapindex>"#;
        let index: SitemapIndex = quick_xml::de::from_str(xml).unwrap();
        let locs: Vec<&str> = index.sitemaps.iter().map(|s| s.loc.as_str()).collect();
        assert_eq!(
            locs,
            vec![
                "https://docs.example.com/sitemap-1.xml",
                "https://docs.example.com/sitemap-2.xml"
            ]
        );
    }

    #[test]
    fn sitemap_location_uses_origin_root() {
        let root = Url::parse("https://docs.example.com/en/guide/").unwrap();
        let loc = sitemap_location(&root).unwrap();
        assert_eq!(loc.as_str(), "https://docs.example.com/sitemap.xml");
    }

    #[test]
    fn sitemap_location_keeps_the_port() {
        let root = Url::parse("http://127.0.0.1:8088/docs?x=1").unwrap();
        let loc = sitemap_location(&root).unwrap();
        assert_eq!(loc.as_str(), "http://127.0.0.1:8088/sitemap.xml");
    }
}
