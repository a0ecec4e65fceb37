//! Chunk splitting and annotation.
//!
//! Window math lives behind [`ChunkSplitter`]: windows come back in
//! document order, adjacent windows share `overlap` units of content,
//! and the final window may be shorter than `chunk_size`. The remote
//! chunkMarkdown service is the production splitter; the in-process
//! [`WindowChunker`] honours the same contract for offline use and
//! tests.
//!
//! [`annotate_windows`] turns raw windows into chunk metadata:
//! 0-based ordinals in window order, the enclosing heading path, and
//! the fenced-code flag.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChunkingConfig;
use crate::headings;
use crate::models::ChunkedWindow;

#[async_trait]
pub trait ChunkSplitter: Send + Sync {
    /// Split `content` into ordered, overlapping text windows.
    async fn split(&self, content: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>>;
}

/// Construct the configured splitter: remote when `splitter_url` is
/// set, in-process windows otherwise.
pub fn create_splitter(config: &ChunkingConfig) -> Result<Box<dyn ChunkSplitter>> {
    match &config.splitter_url {
        Some(url) => Ok(Box::new(HttpChunker::new(url.clone(), config.timeout_secs)?)),
        None => Ok(Box::new(WindowChunker)),
    }
}

// ============ Remote splitter ============

#[derive(Serialize)]
struct ChunkRequest<'a> {
    content: &'a str,
    chunk_size: usize,
    overlap: usize,
}

#[derive(Deserialize)]
struct ChunkResponse {
    chunks: Vec<String>,
}

/// Client for the chunkMarkdown RPC: `POST {base}/chunk` with the
/// content and window parameters, returning the ordered window list.
pub struct HttpChunker {
    base_url: String,
    client: reqwest::Client,
}

impl HttpChunker {
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ChunkSplitter for HttpChunker {
    async fn split(&self, content: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
        let url = format!("{}/chunk", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ChunkRequest {
                content,
                chunk_size,
                overlap,
            })
            .send()
            .await
            .with_context(|| format!("Failed to reach chunker at {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chunker returned {status}: {body}");
        }

        let parsed: ChunkResponse = response
            .json()
            .await
            .context("Invalid chunker response: expected {\"chunks\": [...]}")?;

        Ok(parsed.chunks)
    }
}

// ============ In-process splitter ============

/// Fixed character windows with overlap. Windows advance by
/// `chunk_size - overlap` characters, so adjacent windows share
/// exactly `overlap` characters; the final window may be shorter.
pub struct WindowChunker;

#[async_trait]
impl ChunkSplitter for WindowChunker {
    async fn split(&self, content: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be > 0");
        }
        if overlap >= chunk_size {
            anyhow::bail!("overlap must be smaller than chunk_size");
        }

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let chars: Vec<char> = content.chars().collect();
        let step = chunk_size - overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + chunk_size).min(chars.len());
            windows.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        Ok(windows)
    }
}

// ============ Annotation ============

/// Attach ordinals, heading paths, and code flags to splitter output.
///
/// Pure transform: persistence and `processed_at` advancement stay
/// with the caller, so a failure mid-page leaves the page eligible
/// for retry.
pub fn annotate_windows(document: &str, windows: Vec<String>) -> Vec<ChunkedWindow> {
    windows
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| {
            if !text.is_empty() && !document.contains(&text) {
                // Normalization drift between the splitter's view and
                // ours; the chunk keeps an empty path rather than
                // failing the page.
                tracing::warn!(ordinal, "chunk text not found verbatim in document");
            }
            let heading_path = headings::heading_path(document, &text);
            let has_code = headings::has_code(&text);
            ChunkedWindow {
                has_code,
                heading_path,
                ordinal,
                text,
            }
        })
        .collect()
}
