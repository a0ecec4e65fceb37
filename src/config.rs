use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    /// Fixed-window fetch budget. Requests beyond this count within one
    /// window sleep until the window rolls over.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Discovery passes over links found while scraping. Pass one covers
    /// the sitemap (or harvested seed links); pass two covers in-page
    /// navigation the sitemap omitted.
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,
    /// Optional Jina-style reader service for HTML→Markdown conversion,
    /// e.g. `https://r.jina.ai`. When unset, pages store raw HTML only.
    #[serde(default)]
    pub reader_url: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            timeout_secs: default_timeout_secs(),
            max_passes: default_max_passes(),
            reader_url: None,
        }
    }
}

fn default_requests_per_minute() -> u32 {
    20
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_passes() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Base URL of the remote chunkMarkdown service. When unset, the
    /// in-process window splitter is used.
    #[serde(default)]
    pub splitter_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// One of `disabled`, `gemini`, `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Delay before the single retry after an HTTP 429.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_retry_delay_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_answer_model")]
    pub model: String,
    #[serde(default = "default_answer_style")]
    pub style: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            model: default_answer_model(),
            style: default_answer_style(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_answer_model() -> String {
    "models/gemini-1.5-pro".to_string()
}
fn default_answer_style() -> String {
    "verbose".to_string()
}
fn default_temperature() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// One of `fs`, `http`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Root directory for the `fs` backend.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Base URL, bucket, and key for the `http` backend.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            root: default_storage_root(),
            url: None,
            bucket: default_bucket(),
            api_key: None,
        }
    }
}

fn default_storage_backend() -> String {
    "fs".to_string()
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/pages")
}
fn default_bucket() -> String {
    "pages".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Externally reachable base URL, used to build webhook callbacks
    /// for the async crawl provider.
    #[serde(default)]
    pub public_url: Option<String>,
}

/// Optional firecrawl-style crawl provider.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.crawl.requests_per_minute == 0 {
        anyhow::bail!("crawl.requests_per_minute must be > 0");
    }
    if config.crawl.max_passes == 0 {
        anyhow::bail!("crawl.max_passes must be > 0");
    }

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.embedding.provider.as_str() {
        "disabled" | "gemini" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, gemini, or ollama.",
            other
        ),
    }

    match config.storage.backend.as_str() {
        "fs" => {}
        "http" => {
            if config.storage.url.is_none() {
                anyhow::bail!("storage.url must be set when storage.backend is 'http'");
            }
        }
        other => anyhow::bail!("Unknown storage backend: '{}'. Must be fs or http.", other),
    }

    Ok(config)
}
