//! Optional crawl-provider client (firecrawl-style).
//!
//! Two capabilities: `map_url` returns the provider's view of a site's
//! URL set, and `crawl_async` starts a server-side crawl that delivers
//! captured pages back to us one webhook callback at a time. The
//! webhook itself is handled in [`crate::server`]; this module only
//! starts jobs and keys them idempotently.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ProviderConfig;

pub struct CrawlProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct MapRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct MapResponse {
    #[serde(default)]
    links: Vec<String>,
}

#[derive(Serialize)]
struct ScrapeOptions {
    formats: Vec<String>,
}

#[derive(Serialize)]
struct CrawlRequest<'a> {
    url: &'a str,
    webhook: &'a str,
    limit: u32,
    #[serde(rename = "scrapeOptions")]
    scrape_options: ScrapeOptions,
}

#[derive(Deserialize)]
struct CrawlResponse {
    id: String,
}

impl CrawlProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    /// Ask the provider for every URL it can see under `url`.
    pub async fn map_url(&self, url: &str) -> Result<Vec<String>> {
        let response = self
            .request(reqwest::Method::POST, "/v1/map")
            .json(&MapRequest { url })
            .send()
            .await
            .context("Failed to reach crawl provider")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Provider map failed with {status}: {body}");
        }

        let parsed: MapResponse = response.json().await.context("Invalid map response")?;
        Ok(parsed.links)
    }

    /// Start an asynchronous crawl delivering pages to `webhook_url`.
    ///
    /// The idempotency key lets a retried start call converge on the
    /// same provider job instead of launching a duplicate crawl.
    pub async fn crawl_async(
        &self,
        url: &str,
        limit: u32,
        webhook_url: &str,
        idempotency_key: &str,
    ) -> Result<String> {
        let request = CrawlRequest {
            url,
            webhook: webhook_url,
            limit,
            scrape_options: ScrapeOptions {
                formats: vec!["html".to_string(), "markdown".to_string()],
            },
        };

        let response = self
            .request(reqwest::Method::POST, "/v1/crawl")
            .header("x-idempotency-key", idempotency_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach crawl provider")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Provider crawl failed with {status}: {body}");
        }

        let parsed: CrawlResponse = response.json().await.context("Invalid crawl response")?;
        tracing::info!(job_id = %parsed.id, %url, "started provider crawl");
        Ok(parsed.id)
    }
}
