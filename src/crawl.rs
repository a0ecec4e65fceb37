//! Crawl orchestration: discovery passes, page capture, and crawl
//! state advancement for one source.
//!
//! Discovery prefers the sitemap; when that fails the crawl falls back
//! to link harvesting seeded from the root URL. Links found while
//! scraping are fed into the next discovery pass (bounded by
//! `crawl.max_passes`), which catches pages reachable only through
//! in-page navigation. Every page fetch goes through the fixed-window
//! rate limiter; per-URL failures are logged and counted, never fatal
//! to the run.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use url::Url;
use uuid::Uuid;

use crate::blobstore::{self, BlobStore};
use crate::config::Config;
use crate::db;
use crate::frontier;
use crate::harvest;
use crate::markdown;
use crate::models::{CrawlReport, UrlRecord};
use crate::provider::CrawlProvider;
use crate::ratelimit::FixedWindowLimiter;
use crate::reader;
use crate::sitemap;

pub async fn run_crawl(config: &Config, root_url: &str, name: Option<String>) -> Result<CrawlReport> {
    let parsed = Url::parse(root_url).with_context(|| format!("Invalid URL: {root_url}"))?;
    let source_name = name.unwrap_or_else(|| {
        parsed
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| root_url.to_string())
    });

    let pool = db::connect(config).await?;
    let store = blobstore::create_store(&config.storage)?;
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.crawl.timeout_secs))
        .build()?;

    let source_id = frontier::get_or_create_source(&pool, root_url, &source_name).await?;
    tracing::info!(%source_id, %root_url, "starting crawl");

    // Strategy 1: sitemap. On failure, ask the crawl provider for its
    // URL map when one is configured, else seed link harvesting from
    // the root; the in-page sweep below picks up the rest.
    let mut candidates = match sitemap::discover_from_sitemap(&client, &parsed).await {
        Ok(urls) => {
            tracing::info!(count = urls.len(), "sitemap discovery succeeded");
            urls
        }
        Err(err) => {
            tracing::warn!(error = %err, "sitemap discovery failed");
            discover_without_sitemap(config, root_url).await
        }
    };

    let mut limiter = FixedWindowLimiter::per_minute(config.crawl.requests_per_minute);
    let mut report = CrawlReport {
        source_id: source_id.clone(),
        ..Default::default()
    };

    for pass in 0..config.crawl.max_passes {
        if !candidates.is_empty() {
            // One transaction per discovery batch: the frontier never
            // keeps a half-inserted batch on failure.
            let mut tx = pool.begin().await?;
            let ids = frontier::discover(&mut tx, &source_id, &candidates).await?;
            tx.commit().await?;
            report.discovered += ids.len() as u64;
        }

        // Read the work queue fresh so this pass sees everything
        // discovered so far, including mid-crawl additions.
        let queue = frontier::next_unscraped(&pool, &source_id).await?;
        if queue.is_empty() {
            break;
        }
        tracing::info!(pass, pending = queue.len(), "scraping pass");

        let mut found_in_pages: Vec<String> = Vec::new();
        for record in &queue {
            limiter.acquire().await;

            match capture_page(&pool, store.as_ref(), &client, config, record).await {
                Ok(links) => {
                    report.scraped += 1;
                    found_in_pages.extend(links);
                }
                Err(err) => {
                    tracing::warn!(url = %record.url, error = %err, "failed to capture page");
                    report.failed += 1;
                    report.failures.push(record.url.clone());
                }
            }
        }

        candidates = found_in_pages;
    }

    tracing::info!(
        discovered = report.discovered,
        scraped = report.scraped,
        failed = report.failed,
        "crawl finished"
    );

    pool.close().await;
    Ok(report)
}

/// Fallback discovery when the sitemap is unusable: the provider's
/// URL map if one is configured, otherwise the root URL itself as the
/// link-harvesting seed.
async fn discover_without_sitemap(config: &Config, root_url: &str) -> Vec<String> {
    if let Some(provider_config) = &config.provider {
        match CrawlProvider::new(provider_config) {
            Ok(provider) => match provider.map_url(root_url).await {
                Ok(urls) if !urls.is_empty() => {
                    tracing::info!(count = urls.len(), "provider map discovery succeeded");
                    return urls;
                }
                Ok(_) => tracing::warn!("provider map returned no urls"),
                Err(err) => tracing::warn!(error = %err, "provider map discovery failed"),
            },
            Err(err) => tracing::warn!(error = %err, "could not create crawl provider"),
        }
    }

    tracing::info!("falling back to link harvesting from the root URL");
    vec![root_url.to_string()]
}

/// Fetch one URL, persist its payloads, and advance its crawl state.
///
/// Returns the same-domain links harvested from the page, for the next
/// discovery pass. The page row and the scraped flag are written in
/// one transaction, so a crash between them cannot strand a URL in a
/// half-captured state.
async fn capture_page(
    pool: &SqlitePool,
    store: &dyn BlobStore,
    client: &reqwest::Client,
    config: &Config,
    record: &UrlRecord,
) -> Result<Vec<String>> {
    let page_url = Url::parse(&record.url).with_context(|| format!("Invalid URL: {}", record.url))?;

    // A webhook delivery or concurrent operation may have captured
    // this URL since the queue was read; don't fetch it twice.
    if frontier::is_scraped(pool, &record.id).await? {
        return Ok(Vec::new());
    }

    let response = client
        .get(&record.url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", record.url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("GET {} returned {status}", record.url);
    }

    let html = response
        .text()
        .await
        .with_context(|| format!("Failed to read body of {}", record.url))?;

    let mut links = harvest::harvest_html_links(&html, &page_url);

    let page_id = Uuid::new_v4().to_string();
    let html_key = format!("{}/{}/page.html", record.id, page_id);
    store.put(&html_key, html.as_bytes()).await?;

    let mut title = markdown::title_from_html(&html);

    // Markdown conversion is delegated to the reader service when one
    // is configured; a reader failure degrades the page to HTML-only
    // instead of failing the capture.
    let mut markdown_key = None;
    if let Some(reader_url) = &config.crawl.reader_url {
        match reader::fetch_markdown(client, reader_url, &record.url).await {
            Ok(raw) => {
                if title.is_none() {
                    title = reader::title_from_markdown(&raw);
                }
                links.extend(harvest::harvest_markdown_links(&raw, &page_url));
                let cleaned = markdown::clean_markdown(&raw);
                let key = format!("{}/{}/page.md", record.id, page_id);
                store.put(&key, cleaned.as_bytes()).await?;
                markdown_key = Some(key);
            }
            Err(err) => {
                tracing::warn!(url = %record.url, error = %err, "reader conversion failed");
            }
        }
    }

    let mut tx = pool.begin().await?;

    // At most one page per URL; a page that already exists (e.g. from
    // a webhook delivery racing this crawl) only needs the flag.
    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM pages WHERE url_id = ?")
        .bind(&record.id)
        .fetch_optional(&mut *tx)
        .await?;

    if existing.is_none() {
        sqlx::query(
            r#"
            INSERT INTO pages (id, url_id, html_key, markdown_key, title)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&page_id)
        .bind(&record.id)
        .bind(&html_key)
        .bind(&markdown_key)
        .bind(&title)
        .execute(&mut *tx)
        .await?;
    }

    frontier::mark_scraped(&mut tx, &record.id).await?;
    tx.commit().await?;

    Ok(links)
}
