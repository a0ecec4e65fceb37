//! Core data models used throughout docrag.
//!
//! These types represent the sources, URLs, pages, and chunks that flow
//! through the crawl, chunking, and retrieval pipeline.

use serde::Serialize;

/// A registered documentation site root.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Source {
    pub id: String,
    pub root_url: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One discovered URL belonging to a source.
///
/// `scraped` flips false→true exactly once, after content capture
/// succeeds, and never reverts.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct UrlRecord {
    pub id: String,
    pub source_id: String,
    pub url: String,
    pub scraped: bool,
}

/// Captured content for a URL. The raw HTML/Markdown bodies live in the
/// blob store; only their keys are stored here.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Page {
    pub id: String,
    pub url_id: String,
    pub html_key: Option<String>,
    pub markdown_key: Option<String>,
    pub title: Option<String>,
    /// Unix timestamp, set exactly once when chunking completes.
    /// Pages with a non-null value are excluded from future chunk runs.
    pub processed_at: Option<i64>,
}

/// One retrievable unit of text before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkedWindow {
    pub text: String,
    /// 0-based position within the page, in document order.
    pub ordinal: usize,
    /// Enclosing headings, outermost first, e.g. `["# A", "## B"]`.
    pub heading_path: Vec<String>,
    pub has_code: bool,
}

/// A ranked retrieval result with enough provenance for a caller to
/// cite it.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source_url: String,
    pub heading_path: Vec<String>,
    pub ordinal: i64,
    pub distance: f64,
}

/// Outcome of a best-effort batch operation.
///
/// Batch loops swallow per-item failures so one bad URL or page cannot
/// abort the run; this report gives callers the counts and a retry list
/// instead of silent loss.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Identifiers (URLs, page ids) of the items that failed.
    pub failures: Vec<String>,
}

impl BatchReport {
    pub fn success(&mut self) {
        self.succeeded += 1;
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn fail(&mut self, item: impl Into<String>) {
        self.failed += 1;
        self.failures.push(item.into());
    }
}

/// Summary of a crawl operation across its discovery passes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub source_id: String,
    pub discovered: u64,
    pub scraped: u64,
    pub failed: u64,
    pub failures: Vec<String>,
}
