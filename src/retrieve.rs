//! Vector-similarity retrieval over persisted chunks.
//!
//! Ranks chunks by ascending cosine distance between the query
//! embedding and each stored embedding, computed in Rust over a single
//! scan. Only chunks with a non-null embedding participate — chunks
//! awaiting the embedding pass simply aren't candidates yet. Ties keep
//! the read order (page, ordinal), which is stable across runs. This
//! is a pure read; nothing is mutated.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, TaskType};
use crate::models::RetrievedChunk;

/// A chunk eligible for ranking: embedded, with its citation
/// provenance attached.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub text: String,
    pub source_url: String,
    pub heading_path: Vec<String>,
    pub ordinal: i64,
    pub embedding: Vec<f32>,
}

/// Rank candidates by ascending cosine distance to `query_embedding`
/// and keep the closest `limit`.
pub fn rank(
    candidates: Vec<ChunkCandidate>,
    query_embedding: &[f32],
    limit: usize,
) -> Vec<RetrievedChunk> {
    let mut scored: Vec<RetrievedChunk> = candidates
        .into_iter()
        .map(|c| RetrievedChunk {
            distance: embedding::cosine_distance(query_embedding, &c.embedding) as f64,
            text: c.text,
            source_url: c.source_url,
            heading_path: c.heading_path,
            ordinal: c.ordinal,
        })
        .collect();

    // Stable sort: equal distances keep candidate order.
    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

/// Retrieve the top-`limit` chunks for a precomputed query embedding.
pub async fn retrieve(
    pool: &SqlitePool,
    query_embedding: &[f32],
    limit: usize,
) -> Result<Vec<RetrievedChunk>> {
    let rows = sqlx::query(
        r#"
        SELECT chunks.text, chunks.chunk_index, chunks.heading_path, chunks.embedding, urls.url
        FROM chunks
        JOIN pages ON chunks.page_id = pages.id
        JOIN urls ON pages.url_id = urls.id
        WHERE chunks.embedding IS NOT NULL
        ORDER BY chunks.page_id, chunks.chunk_index
        "#,
    )
    .fetch_all(pool)
    .await?;

    let candidates: Vec<ChunkCandidate> = rows
        .iter()
        .map(|row| {
            let heading_json: String = row.get("heading_path");
            let heading_path: Vec<String> =
                serde_json::from_str(&heading_json).unwrap_or_default();
            let blob: Vec<u8> = row.get("embedding");
            ChunkCandidate {
                text: row.get("text"),
                source_url: row.get("url"),
                heading_path,
                ordinal: row.get("chunk_index"),
                embedding: embedding::blob_to_vec(&blob),
            }
        })
        .collect();

    Ok(rank(candidates, query_embedding, limit))
}

/// Embed `query` as a retrieval query and rank against the corpus.
pub async fn retrieve_for_query(
    config: &Config,
    pool: &SqlitePool,
    query: &str,
    limit: usize,
) -> Result<Vec<RetrievedChunk>> {
    let provider = embedding::create_provider(&config.embedding)?;
    let query_embedding = embedding::embed_text(
        provider.as_ref(),
        &config.embedding,
        query,
        TaskType::RetrievalQuery,
    )
    .await?;

    retrieve(pool, &query_embedding, limit).await
}

/// CLI entry: print ranked chunks with their provenance.
pub async fn run_retrieve(config: &Config, query: &str, limit: usize) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        anyhow::bail!("Retrieval requires embeddings. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;
    let results = retrieve_for_query(config, &pool, query, limit).await?;

    if results.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, result.distance, result.source_url);
        if !result.heading_path.is_empty() {
            println!("    section: {}", result.heading_path.join(" > "));
        }
        println!("    chunk: #{}", result.ordinal);
        println!(
            "    excerpt: \"{}\"",
            excerpt(&result.text).replace('\n', " ")
        );
        println!();
    }

    pool.close().await;
    Ok(())
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(240) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
