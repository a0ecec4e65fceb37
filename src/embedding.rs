//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete backends:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are not configured.
//! - **[`GeminiProvider`]** — calls the Gemini `embedContent` API with a task type.
//! - **[`OllamaProvider`]** — calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Embedding requests that hit HTTP 429 are retried exactly once after
//! a fixed delay (`embedding.retry_delay_secs`); any other failure
//! surfaces immediately and the caller decides whether to skip the
//! item or abort.
//!
//! Also provides vector utilities:
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 encoding for SQLite BLOB columns
//! - [`cosine_similarity`] / [`cosine_distance`] — the retrieval ranking metric

use anyhow::{bail, Result};
use serde::Serialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Task types accepted by the embedding service. The type shifts the
/// vector's semantic optimization, not its shape: documents are
/// embedded as `RetrievalDocument`, queries as `RetrievalQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    SemanticSimilarity,
    Classification,
    Clustering,
    RetrievalDocument,
    RetrievalQuery,
    QuestionAnswering,
    FactVerification,
    CodeRetrievalQuery,
}

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-embedding-001"`).
    fn model_name(&self) -> &str;
}

/// Embed one text using the configured provider.
///
/// Dispatch is config-based; the provider instance carries metadata
/// (actual embedding stays in free functions due to async trait
/// limitations).
pub async fn embed_text(
    _provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
    task: TaskType,
) -> Result<Vec<f32>> {
    match config.provider.as_str() {
        "gemini" => embed_gemini(config, text, task).await,
        "ollama" => embed_ollama(config, text).await,
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "gemini" => Ok(Box::new(GeminiProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
}

// ============ Gemini Provider ============

/// Embedding provider using the Gemini `embedContent` API.
///
/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiProvider {
    model: String,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Gemini provider"))?;

        if std::env::var("GEMINI_API_KEY").is_err() {
            bail!("GEMINI_API_KEY environment variable not set");
        }

        Ok(Self { model })
    }
}

impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiEmbeddingRequest<'a> {
    model: &'a str,
    content: GeminiContent<'a>,
    #[serde(rename = "taskType")]
    task_type: TaskType,
}

async fn embed_gemini(config: &EmbeddingConfig, text: &str, task: TaskType) -> Result<Vec<f32>> {
    let api_key =
        std::env::var("GEMINI_API_KEY").map_err(|_| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let base = config
        .url
        .as_deref()
        .unwrap_or("https://generativelanguage.googleapis.com");
    let url = format!("{base}/v1beta/models/{model}:embedContent?key={api_key}");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = GeminiEmbeddingRequest {
        model,
        content: GeminiContent {
            parts: vec![GeminiPart { text }],
        },
        task_type: task,
    };

    let mut retried = false;
    loop {
        let response = client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            let json: serde_json::Value = response.json().await?;
            return parse_gemini_embedding(&json);
        }

        // One fixed-delay retry on rate limiting, then give up.
        if status.as_u16() == 429 && !retried {
            tracing::warn!(
                delay_secs = config.retry_delay_secs,
                "embedding rate limited, retrying once"
            );
            tokio::time::sleep(Duration::from_secs(config.retry_delay_secs)).await;
            retried = true;
            continue;
        }

        let body_text = response.text().await.unwrap_or_default();
        bail!("Gemini API error {}: {}", status, body_text);
    }
}

fn parse_gemini_embedding(json: &serde_json::Value) -> Result<Vec<f32>> {
    let values = json
        .get("embedding")
        .and_then(|e| e.get("values"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embedding.values"))?;

    Ok(values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance. Ollama has no
/// task-type notion, so the task parameter is ignored on this path.
pub struct OllamaProvider {
    model: String,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        Ok(Self { model })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
}

async fn embed_ollama(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let url = config.url.as_deref().unwrap_or("http://localhost:11434");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": [text],
    });

    let mut retried = false;
    loop {
        let response = client
            .post(format!("{url}/api/embed"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!("Ollama connection error (is Ollama running at {url}?): {e}")
            })?;

        let status = response.status();

        if status.is_success() {
            let json: serde_json::Value = response.json().await?;
            return parse_ollama_embedding(&json);
        }

        if status.as_u16() == 429 && !retried {
            tokio::time::sleep(Duration::from_secs(config.retry_delay_secs)).await;
            retried = true;
            continue;
        }

        let body_text = response.text().await.unwrap_or_default();
        bail!("Ollama API error {}: {}", status, body_text);
    }
}

fn parse_ollama_embedding(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    Ok(first
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance, the retrieval ranking metric: lower is closer.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_or_mismatched_is_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn task_type_serializes_screaming_snake() {
        let s = serde_json::to_string(&TaskType::RetrievalDocument).unwrap();
        assert_eq!(s, "\"RETRIEVAL_DOCUMENT\"");
        let q = serde_json::to_string(&TaskType::RetrievalQuery).unwrap();
        assert_eq!(q, "\"RETRIEVAL_QUERY\"");
    }

    #[test]
    fn parses_gemini_embedding_values() {
        let json = serde_json::json!({"embedding": {"values": [0.25, -0.5]}});
        assert_eq!(parse_gemini_embedding(&json).unwrap(), vec![0.25, -0.5]);
    }

    #[test]
    fn parses_ollama_embedding_values() {
        let json = serde_json::json!({"embeddings": [[0.1, 0.2, 0.3]]});
        assert_eq!(parse_ollama_embedding(&json).unwrap(), vec![0.1, 0.2, 0.3]);
    }
}
