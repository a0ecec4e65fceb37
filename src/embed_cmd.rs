//! Embedding passes over persisted chunks.
//!
//! `pending` embeds every chunk whose embedding column is still NULL;
//! `rebuild` clears all vectors first and regenerates everything.
//! Chunks are embedded one at a time as retrieval documents; a chunk
//! that fails stays NULL (and therefore invisible to retrieval) and
//! the pass continues.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, TaskType};
use crate::models::BatchReport;

pub async fn run_embed_pending(config: &Config, limit: Option<usize>) -> Result<BatchReport> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;
    let report = embed_pending_chunks(config, &pool, limit).await?;
    pool.close().await;
    Ok(report)
}

pub async fn run_embed_rebuild(config: &Config) -> Result<BatchReport> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;

    sqlx::query("UPDATE chunks SET embedding = NULL")
        .execute(&pool)
        .await?;
    tracing::info!("cleared existing embeddings");

    let report = embed_pending_chunks(config, &pool, None).await?;
    pool.close().await;
    Ok(report)
}

/// Embed every chunk with a NULL embedding, oldest pages first.
pub async fn embed_pending_chunks(
    config: &Config,
    pool: &SqlitePool,
    limit: Option<usize>,
) -> Result<BatchReport> {
    let provider = embedding::create_provider(&config.embedding)?;
    let limit_val = limit.unwrap_or(usize::MAX) as i64;

    let rows = sqlx::query(
        r#"
        SELECT id, text FROM chunks
        WHERE embedding IS NULL
        ORDER BY page_id, chunk_index
        LIMIT ?
        "#,
    )
    .bind(limit_val)
    .fetch_all(pool)
    .await?;

    tracing::info!(pending = rows.len(), "embedding pending chunks");

    let mut report = BatchReport::default();

    for row in &rows {
        let chunk_id: String = row.get("id");
        let text: String = row.get("text");

        match embedding::embed_text(
            provider.as_ref(),
            &config.embedding,
            &text,
            TaskType::RetrievalDocument,
        )
        .await
        {
            Ok(vector) => {
                let blob = embedding::vec_to_blob(&vector);
                sqlx::query("UPDATE chunks SET embedding = ? WHERE id = ?")
                    .bind(&blob)
                    .bind(&chunk_id)
                    .execute(pool)
                    .await?;
                report.success();
            }
            Err(err) => {
                tracing::warn!(chunk_id = %chunk_id, error = %err, "failed to embed chunk");
                report.fail(chunk_id);
            }
        }
    }

    Ok(report)
}
