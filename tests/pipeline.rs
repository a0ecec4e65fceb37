//! End-to-end pipeline test against a mock documentation site:
//! sitemap discovery → page capture (with second-pass link discovery)
//! → chunking → embedding → retrieval ranking.

use std::fs;
use std::path::PathBuf;

use httpmock::prelude::*;
use tempfile::TempDir;

use docrag::config::{self, Config};
use docrag::{crawl, embed_cmd, migrate, process, retrieve};

async fn setup(server: &MockServer) -> (TempDir, Config, sqlx::SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docrag.sqlite"

[crawl]
requests_per_minute = 1000
reader_url = "{base}/reader"

[chunking]
chunk_size = 400
overlap = 80

[embedding]
provider = "ollama"
model = "mock-embed"
url = "{base}"

[storage]
backend = "fs"
root = "{root}/pages"

[server]
bind = "127.0.0.1:7441"
"#,
        root = root.display(),
        base = server.base_url(),
    );

    let config_path: PathBuf = root.join("docrag.toml");
    fs::write(&config_path, config_content).unwrap();

    let cfg = config::load_config(&config_path).unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
    let pool = docrag::db::connect(&cfg).await.unwrap();

    (tmp, cfg, pool)
}

/// Mock site: sitemap lists /a and /b; page /a links to /c, which the
/// sitemap omits; the reader serves markdown for all three; the
/// embedding endpoint returns a fixed vector per topic word.
async fn mock_site(server: &MockServer) {
    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/a</loc></url>
  <url><loc>{base}/b</loc></url>
</urlset>"#,
        base = server.base_url(),
    );
    server
        .mock_async(|when, then| {
            when.method(GET).path("/sitemap.xml");
            then.status(200).body(sitemap);
        })
        .await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/a");
            then.status(200).body(
                r#"<html><head><title>Alpha Guide</title></head>
<body><a href="/c">extras</a><p>alpha body</p></body></html>"#,
            );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/b");
            then.status(200).body(
                "<html><head><title>Beta Reference</title></head><body><p>beta body</p></body></html>",
            );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/c");
            then.status(200).body(
                "<html><head><title>Gamma Extras</title></head><body><p>gamma body</p></body></html>",
            );
        })
        .await;

    // Reader conversions, one per page.
    let beta_markdown = format!("# beta reference\n\n{}", "beta usage notes ".repeat(60));
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/reader/").path_contains("/a");
            then.status(200)
                .body("Title: Alpha Guide\n\n# alpha guide\n\nalpha setup alpha install alpha run.");
        })
        .await;
    server
        .mock_async(move |when, then| {
            when.method(GET).path_contains("/reader/").path_contains("/b");
            then.status(200).body(beta_markdown);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/reader/").path_contains("/c");
            then.status(200)
                .body("Title: Gamma Extras\n\n# gamma extras\n\ngamma appendix gamma notes.");
        })
        .await;

    // Embeddings: one fixed vector per topic word; the matchers are
    // mutually exclusive because each page sticks to its own word.
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed").body_contains("alpha");
            then.status(200).json_body(serde_json::json!({"embeddings": [[1.0, 0.0]]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed").body_contains("beta");
            then.status(200).json_body(serde_json::json!({"embeddings": [[0.0, 1.0]]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed").body_contains("gamma");
            then.status(200).json_body(serde_json::json!({"embeddings": [[0.6, 0.8]]}));
        })
        .await;
}

#[tokio::test]
async fn crawl_chunk_embed_retrieve_end_to_end() {
    let server = MockServer::start_async().await;
    mock_site(&server).await;
    let (_tmp, cfg, pool) = setup(&server).await;

    let root_url = format!("{}/", server.base_url());

    // ---- Crawl: both sitemap URLs plus the in-page link to /c.
    let report = crawl::run_crawl(&cfg, &root_url, None).await.unwrap();
    assert_eq!(report.scraped, 3, "failures: {:?}", report.failures);
    assert_eq!(report.failed, 0);

    let (total, scraped): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(scraped), 0) FROM urls")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(total, 3);
    assert_eq!(scraped, 3);

    // ---- Re-crawl: everything already scraped, nothing fetched twice.
    let second = crawl::run_crawl(&cfg, &root_url, None).await.unwrap();
    assert_eq!(second.scraped, 0);
    let total_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM urls")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total_after, 3);

    // ---- Chunk: all three pages, contiguous per-page ordinals.
    let chunk_report = process::run_chunk_pages(&cfg).await.unwrap();
    assert_eq!(chunk_report.succeeded, 3, "failures: {:?}", chunk_report.failures);
    assert_eq!(chunk_report.failed, 0);

    let beta_indexes: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT chunks.chunk_index FROM chunks
        JOIN pages ON chunks.page_id = pages.id
        JOIN urls ON pages.url_id = urls.id
        WHERE urls.url LIKE '%/b'
        ORDER BY chunks.chunk_index
        "#,
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert!(beta_indexes.len() > 1, "long page should split into several windows");
    let expected: Vec<i64> = (0..beta_indexes.len() as i64).collect();
    assert_eq!(beta_indexes, expected);

    // Windows past the heading carry it in their path.
    let later_path: String = sqlx::query_scalar(
        r#"
        SELECT chunks.heading_path FROM chunks
        JOIN pages ON chunks.page_id = pages.id
        JOIN urls ON pages.url_id = urls.id
        WHERE urls.url LIKE '%/b' AND chunks.chunk_index = 1
        "#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    let later_path: Vec<String> = serde_json::from_str(&later_path).unwrap();
    assert_eq!(later_path, vec!["# beta reference"]);

    // ---- Processed pages are excluded from another run.
    let rerun = process::run_chunk_pages(&cfg).await.unwrap();
    assert_eq!(rerun.succeeded, 0);
    assert_eq!(rerun.skipped, 0);

    // ---- Embed every pending chunk.
    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await
        .unwrap();
    let embed_report = embed_cmd::run_embed_pending(&cfg, None).await.unwrap();
    assert_eq!(embed_report.succeeded as i64, total_chunks);
    assert_eq!(embed_report.failed, 0);

    let unembedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE embedding IS NULL")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(unembedded, 0);

    // ---- Retrieve: the alpha page outranks gamma, gamma outranks beta.
    let results = retrieve::retrieve_for_query(&cfg, &pool, "alpha setup question", 50)
        .await
        .unwrap();
    assert_eq!(results.len() as i64, total_chunks);
    assert!(results[0].source_url.ends_with("/a"));
    assert!(results[0].distance < 1e-6);
    assert!(
        results.last().unwrap().source_url.ends_with("/b"),
        "farthest chunks should come from the beta page"
    );

    // Provenance survives the round trip.
    assert_eq!(results[0].heading_path, Vec::<String>::new());
    assert!(results[0].text.contains("alpha"));

    // ---- A chunk without an embedding is invisible to retrieval.
    let orphan_page: String = sqlx::query_scalar("SELECT id FROM pages LIMIT 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO chunks (id, page_id, chunk_index, text, heading_path, has_code, created_at)
         VALUES ('orphan', ?, 99, 'alpha alpha alpha', '[]', 0, 0)",
    )
    .bind(&orphan_page)
    .execute(&pool)
    .await
    .unwrap();

    let results = retrieve::retrieve_for_query(&cfg, &pool, "alpha setup question", 50)
        .await
        .unwrap();
    assert_eq!(results.len() as i64, total_chunks, "NULL-embedding chunk must not appear");

    // ---- Limit bounds the result set.
    let top_two = retrieve::retrieve_for_query(&cfg, &pool, "alpha setup question", 2)
        .await
        .unwrap();
    assert_eq!(top_two.len(), 2);
}

#[tokio::test]
async fn sitemap_failure_falls_back_to_link_harvesting() {
    let server = MockServer::start_async().await;

    // No sitemap mock: the fetch 404s and the crawl seeds itself from
    // the root page's links instead.
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(
                r#"<html><body><a href="/guide">guide</a><a href="/api">api</a></body></html>"#,
            );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/guide");
            then.status(200).body("<html><body><p>guide body</p></body></html>");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api");
            then.status(200).body("<html><body><p>api body</p></body></html>");
        })
        .await;

    let (_tmp, mut cfg, pool) = setup(&server).await;
    // This scenario exercises raw HTML capture only.
    cfg.crawl.reader_url = None;

    let root_url = format!("{}/", server.base_url());
    let report = crawl::run_crawl(&cfg, &root_url, None).await.unwrap();

    // Root page plus the two pages it links.
    assert_eq!(report.scraped, 3, "failures: {:?}", report.failures);

    let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM urls ORDER BY url")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert!(urls.iter().any(|u| u.ends_with("/guide")));
    assert!(urls.iter().any(|u| u.ends_with("/api")));
}
