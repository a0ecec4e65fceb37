//! Blob storage for raw page payloads.
//!
//! Captured HTML and Markdown bodies never sit inline in the hot path;
//! pages reference them by key. [`BlobStore`] abstracts the backend:
//! a local directory for single-node deployments and tests, or a
//! Supabase-storage-style HTTP object store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::config::StorageConfig;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Construct the configured backend.
pub fn create_store(config: &StorageConfig) -> Result<Box<dyn BlobStore>> {
    match config.backend.as_str() {
        "fs" => Ok(Box::new(FsBlobStore::new(config.root.clone()))),
        "http" => {
            let base_url = config
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("storage.url required for http backend"))?;
            Ok(Box::new(HttpBlobStore::new(
                base_url,
                config.bucket.clone(),
                config.api_key.clone(),
            )?))
        }
        other => anyhow::bail!("Unknown storage backend: {}", other),
    }
}

// ============ Filesystem backend ============

/// Keys map to files under a root directory; `/` in a key becomes a
/// subdirectory, so page payloads land at `<root>/<url_id>/<page_id>/...`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create blob dir {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write blob {}", path.display()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read blob {}", path.display()))
    }
}

// ============ HTTP object-store backend ============

/// Supabase-storage-style object API: authenticated `POST
/// {base}/storage/v1/object/{bucket}/{key}` with upsert, public `GET
/// {base}/storage/v1/object/public/{bucket}/{key}`.
pub struct HttpBlobStore {
    base_url: String,
    bucket: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new(base_url: String, bucket: String, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key);

        let mut request = self
            .client
            .post(&url)
            .header("x-upsert", "true")
            .body(bytes.to_vec());

        if let Some(api_key) = &self.api_key {
            request = request
                .header("apikey", api_key)
                .header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to upload blob {key}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Blob upload of {key} failed with {status}: {body}");
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch blob {key}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Blob fetch of {key} failed with {status}");
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().to_path_buf());

        store.put("u1/p1/page.html", b"<html></html>").await.unwrap();
        let bytes = store.get("u1/p1/page.html").await.unwrap();
        assert_eq!(bytes, b"<html></html>");
    }

    #[tokio::test]
    async fn fs_store_put_overwrites() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().to_path_buf());

        store.put("k", b"one").await.unwrap();
        store.put("k", b"two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn fs_store_missing_key_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().to_path_buf());
        assert!(store.get("absent").await.is_err());
    }
}
