//! Page → chunk processing.
//!
//! Walks every page that has not been chunked yet (`processed_at IS
//! NULL`), splits its stored markdown through the configured splitter,
//! annotates the windows, and persists chunks and the `processed_at`
//! stamp in one transaction per page. A failure mid-page rolls that
//! page back wholesale, leaving it eligible for the next run; the
//! batch continues past it and reports counts.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::blobstore::{self, BlobStore};
use crate::chunker::{self, ChunkSplitter};
use crate::config::Config;
use crate::db;
use crate::models::BatchReport;

struct PendingPage {
    page_id: String,
    markdown_key: Option<String>,
    url: String,
}

pub async fn run_chunk_pages(config: &Config) -> Result<BatchReport> {
    let pool = db::connect(config).await?;
    let store = blobstore::create_store(&config.storage)?;
    let splitter = chunker::create_splitter(&config.chunking)?;

    let rows = sqlx::query(
        r#"
        SELECT pages.id AS page_id, pages.markdown_key, urls.url
        FROM pages
        JOIN urls ON pages.url_id = urls.id
        WHERE pages.processed_at IS NULL
        ORDER BY pages.rowid
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let pending: Vec<PendingPage> = rows
        .iter()
        .map(|row| PendingPage {
            page_id: row.get("page_id"),
            markdown_key: row.get("markdown_key"),
            url: row.get("url"),
        })
        .collect();

    tracing::info!(pages = pending.len(), "chunking unprocessed pages");

    let mut report = BatchReport::default();

    for page in &pending {
        // Pages the converter never reached have nothing to chunk yet;
        // they stay unprocessed rather than being stamped empty.
        let Some(markdown_key) = &page.markdown_key else {
            tracing::warn!(url = %page.url, "page has no markdown content, skipping");
            report.skip();
            continue;
        };

        match chunk_one_page(
            &pool,
            store.as_ref(),
            splitter.as_ref(),
            config,
            &page.page_id,
            markdown_key,
        )
        .await
        {
            Ok(count) => {
                tracing::info!(url = %page.url, chunks = count, "chunked page");
                report.success();
            }
            Err(err) => {
                tracing::warn!(url = %page.url, error = %err, "failed to chunk page");
                report.fail(page.page_id.clone());
            }
        }
    }

    pool.close().await;
    Ok(report)
}

async fn chunk_one_page(
    pool: &SqlitePool,
    store: &dyn BlobStore,
    splitter: &dyn ChunkSplitter,
    config: &Config,
    page_id: &str,
    markdown_key: &str,
) -> Result<usize> {
    let bytes = store.get(markdown_key).await?;
    let document = String::from_utf8(bytes)
        .with_context(|| format!("Markdown blob {markdown_key} is not valid UTF-8"))?;

    let windows = splitter
        .split(&document, config.chunking.chunk_size, config.chunking.overlap)
        .await?;
    let chunks = chunker::annotate_windows(&document, windows);

    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    for chunk in &chunks {
        let heading_path = serde_json::to_string(&chunk.heading_path)?;
        sqlx::query(
            r#"
            INSERT INTO chunks (id, page_id, chunk_index, text, heading_path, has_code, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(page_id)
        .bind(chunk.ordinal as i64)
        .bind(&chunk.text)
        .bind(&heading_path)
        .bind(chunk.has_code)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    // Stamped only after every chunk landed; gates re-chunking.
    sqlx::query("UPDATE pages SET processed_at = ? WHERE id = ?")
        .bind(now)
        .bind(page_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(chunks.len())
}
