//! HTTP API server.
//!
//! Exposes the crawl/chunk/embed/retrieve/ask operations as a JSON
//! API, plus the inbound webhook for the async crawl provider. Each
//! request is one logical operation: handlers run their batch to
//! completion and reply with the structured report, spawning no
//! background work.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/crawl` | Synchronous crawl of a documentation site |
//! | `POST` | `/api/crawl/async` | Start a provider-side crawl (webhook delivery) |
//! | `POST` | `/api/crawl/webhook` | Provider page-capture callback |
//! | `POST` | `/api/chunk` | Chunk all unprocessed pages |
//! | `POST` | `/api/embeddings` | Embed all pending chunks |
//! | `POST` | `/api/retrieve` | Ranked chunks for a query |
//! | `POST` | `/api/ask` | Grounded answer for a query |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "url is required" } }
//! ```

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::answer;
use crate::blobstore;
use crate::config::Config;
use crate::crawl;
use crate::db;
use crate::embed_cmd;
use crate::frontier;
use crate::process;
use crate::provider::CrawlProvider;
use crate::retrieve;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/crawl", post(handle_crawl))
        .route("/api/crawl/async", post(handle_crawl_async))
        .route("/api/crawl/webhook", post(handle_webhook))
        .route("/api/chunk", post(handle_chunk))
        .route("/api/embeddings", post(handle_embeddings))
        .route("/api/retrieve", post(handle_retrieve))
        .route("/api/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(%bind_addr, "server listening");
    println!("docrag server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error contract ============

struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::warn!(error = %err, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

// ============ Health ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============ Crawl ============

#[derive(Deserialize)]
struct CrawlBody {
    url: String,
    #[serde(default)]
    name: Option<String>,
}

async fn handle_crawl(
    State(state): State<AppState>,
    Json(body): Json<CrawlBody>,
) -> Result<Json<crate::models::CrawlReport>, ApiError> {
    if body.url.trim().is_empty() {
        return Err(ApiError::bad_request("url is required"));
    }

    let report = crawl::run_crawl(&state.config, &body.url, body.name).await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
struct CrawlAsyncBody {
    url: String,
    #[serde(default = "default_async_limit")]
    limit: u32,
}

fn default_async_limit() -> u32 {
    1
}

#[derive(Serialize)]
struct CrawlAsyncResponse {
    job_id: String,
    source_id: String,
}

async fn handle_crawl_async(
    State(state): State<AppState>,
    Json(body): Json<CrawlAsyncBody>,
) -> Result<Json<CrawlAsyncResponse>, ApiError> {
    if body.url.trim().is_empty() {
        return Err(ApiError::bad_request("url is required"));
    }

    let provider_config = state
        .config
        .provider
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("No [provider] configured"))?;

    let public_url = state
        .config
        .server
        .public_url
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("server.public_url required for async crawls"))?;

    let parsed = url::Url::parse(&body.url)
        .map_err(|_| ApiError::bad_request(format!("Invalid URL: {}", body.url)))?;
    let name = parsed.host_str().unwrap_or(&body.url).to_string();

    let source_id = frontier::get_or_create_source(&state.pool, &body.url, &name).await?;

    // The callback carries the source id so the webhook can correlate
    // each delivered page back to its source.
    let webhook_url = format!(
        "{}/api/crawl/webhook?source_id={}",
        public_url.trim_end_matches('/'),
        source_id
    );

    let provider = CrawlProvider::new(provider_config)?;
    let idempotency_key = Uuid::new_v4().to_string();
    let job_id = provider
        .crawl_async(&body.url, body.limit, &webhook_url, &idempotency_key)
        .await?;

    Ok(Json(CrawlAsyncResponse { job_id, source_id }))
}

// ============ Webhook ============

#[derive(Deserialize)]
struct WebhookParams {
    source_id: Option<String>,
}

/// Metadata the provider attaches to a captured page.
#[derive(Debug, Clone, Deserialize)]
struct CaptureMetadata {
    #[serde(rename = "sourceURL")]
    source_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// One captured page as delivered by the provider.
#[derive(Debug, Clone, Deserialize)]
struct CapturedPage {
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
    metadata: CaptureMetadata,
}

/// The provider delivers `data` either as a single object or an array
/// of one. Normalized into one `CapturedPage` at this boundary; core
/// code never branches on payload shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CaptureData {
    One(Box<CapturedPage>),
    Many(Vec<CapturedPage>),
}

impl CaptureData {
    fn normalize(self) -> Option<CapturedPage> {
        match self {
            CaptureData::One(page) => Some(*page),
            CaptureData::Many(pages) => {
                if pages.len() > 1 {
                    tracing::warn!(extra = pages.len() - 1, "webhook delivered more than one page, keeping first");
                }
                pages.into_iter().next()
            }
        }
    }
}

#[derive(Deserialize)]
struct CrawlEvent {
    success: bool,
    #[serde(rename = "type")]
    event: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Option<CaptureData>,
    #[serde(default)]
    error: Option<String>,
}

async fn handle_webhook(
    State(state): State<AppState>,
    Query(params): Query<WebhookParams>,
    Json(event): Json<CrawlEvent>,
) -> Result<StatusCode, ApiError> {
    let source_id = params
        .source_id
        .ok_or_else(|| ApiError::bad_request("source_id query parameter is required"))?;

    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM sources WHERE id = ?")
        .bind(&source_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| ApiError::from(anyhow::Error::from(e)))?;
    if exists.is_none() {
        return Err(ApiError::not_found(format!("Unknown source: {source_id}")));
    }

    if !event.success {
        tracing::warn!(
            job_id = event.id.as_deref().unwrap_or("-"),
            error = event.error.as_deref().unwrap_or("-"),
            "provider reported a failed crawl event"
        );
        return Err(ApiError::bad_request("Crawl event reported failure"));
    }

    if event.event != "crawl.page" {
        // Lifecycle events (crawl.started, crawl.completed) need no
        // state change.
        tracing::info!(event = %event.event, "ignoring non-page crawl event");
        return Ok(StatusCode::OK);
    }

    let page = event
        .data
        .and_then(CaptureData::normalize)
        .ok_or_else(|| ApiError::bad_request("crawl.page event carried no page data"))?;

    let page_url = page
        .metadata
        .source_url
        .clone()
        .ok_or_else(|| ApiError::bad_request("Captured page has no sourceURL"))?;

    persist_captured_page(&state, &source_id, &page_url, page).await?;
    Ok(StatusCode::OK)
}

/// Store a webhook-delivered page: discover its URL under the source,
/// write the payload blobs, create the page row, and mark the URL
/// scraped — the same lifecycle a synchronous crawl walks.
async fn persist_captured_page(
    state: &AppState,
    source_id: &str,
    page_url: &str,
    page: CapturedPage,
) -> Result<(), ApiError> {
    let store = blobstore::create_store(&state.config.storage)?;

    let mut tx = state.pool.begin().await.map_err(anyhow::Error::from)?;
    let ids = frontier::discover(&mut tx, source_id, &[page_url.to_string()]).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    let url_id = ids
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::from(anyhow::anyhow!("discover returned no id")))?;

    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM pages WHERE url_id = ?")
        .bind(&url_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(anyhow::Error::from)?;

    if existing.is_none() {
        let page_id = Uuid::new_v4().to_string();

        let mut html_key = None;
        if let Some(html) = &page.html {
            let key = format!("{url_id}/{page_id}/page.html");
            store.put(&key, html.as_bytes()).await?;
            html_key = Some(key);
        }

        let mut markdown_key = None;
        if let Some(markdown) = &page.markdown {
            let key = format!("{url_id}/{page_id}/page.md");
            store.put(&key, markdown.as_bytes()).await?;
            markdown_key = Some(key);
        }

        let mut tx = state.pool.begin().await.map_err(anyhow::Error::from)?;
        sqlx::query(
            r#"
            INSERT INTO pages (id, url_id, html_key, markdown_key, title)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&page_id)
        .bind(&url_id)
        .bind(&html_key)
        .bind(&markdown_key)
        .bind(&page.metadata.title)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        frontier::mark_scraped(&mut tx, &url_id).await?;
        tx.commit().await.map_err(anyhow::Error::from)?;
    } else {
        // Already captured by a racing crawl; just settle the flag.
        let mut tx = state.pool.begin().await.map_err(anyhow::Error::from)?;
        frontier::mark_scraped(&mut tx, &url_id).await?;
        tx.commit().await.map_err(anyhow::Error::from)?;
    }

    tracing::info!(url = %page_url, "captured page from webhook");
    Ok(())
}

// ============ Chunk / embed ============

async fn handle_chunk(
    State(state): State<AppState>,
) -> Result<Json<crate::models::BatchReport>, ApiError> {
    let report = process::run_chunk_pages(&state.config).await?;
    Ok(Json(report))
}

async fn handle_embeddings(
    State(state): State<AppState>,
) -> Result<Json<crate::models::BatchReport>, ApiError> {
    if !state.config.embedding.is_enabled() {
        return Err(ApiError::bad_request(
            "Embedding provider is disabled. Set [embedding] provider in config.",
        ));
    }
    let report = embed_cmd::embed_pending_chunks(&state.config, &state.pool, None).await?;
    Ok(Json(report))
}

// ============ Retrieve / ask ============

#[derive(Deserialize)]
struct QueryBody {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<Vec<crate::models::RetrievedChunk>>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(ApiError::bad_request("query is required"));
    }
    if !state.config.embedding.is_enabled() {
        return Err(ApiError::bad_request(
            "Retrieval requires embeddings. Set [embedding] provider in config.",
        ));
    }

    let results =
        retrieve::retrieve_for_query(&state.config, &state.pool, &body.query, body.limit).await?;
    Ok(Json(results))
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<answer::GroundedAnswer>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(ApiError::bad_request("query is required"));
    }
    if !state.config.embedding.is_enabled() {
        return Err(ApiError::bad_request(
            "Asking requires embeddings. Set [embedding] provider in config.",
        ));
    }

    let grounded = answer::answer_query(&state.config, &state.pool, &body.query, body.limit).await?;
    Ok(Json(grounded))
}
