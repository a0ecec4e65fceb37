//! Crawl-state machine properties against a real SQLite database:
//! idempotent registration and discovery, one-directional scrape
//! transitions, and the freshness of the unscraped work queue.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use docrag::config::{self, Config};
use docrag::{frontier, migrate};

async fn setup() -> (TempDir, Config, sqlx::SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_content = format!(
        r#"[db]
path = "{}/data/docrag.sqlite"

[chunking]
chunk_size = 400
overlap = 80

[server]
bind = "127.0.0.1:7431"
"#,
        root.display()
    );

    let config_path: PathBuf = root.join("docrag.toml");
    fs::write(&config_path, config_content).unwrap();

    let cfg = config::load_config(&config_path).unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
    let pool = docrag::db::connect(&cfg).await.unwrap();

    (tmp, cfg, pool)
}

#[tokio::test]
async fn get_or_create_source_is_idempotent() {
    let (_tmp, _cfg, pool) = setup().await;

    let first = frontier::get_or_create_source(&pool, "https://docs.example.com", "example")
        .await
        .unwrap();
    let second = frontier::get_or_create_source(&pool, "https://docs.example.com", "example")
        .await
        .unwrap();
    assert_eq!(first, second);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn reregistering_touches_updated_at_only() {
    let (_tmp, _cfg, pool) = setup().await;

    let id = frontier::get_or_create_source(&pool, "https://docs.example.com", "example")
        .await
        .unwrap();

    // Push updated_at into the past, then re-register.
    sqlx::query("UPDATE sources SET updated_at = 100 WHERE id = ?")
        .bind(&id)
        .execute(&pool)
        .await
        .unwrap();

    frontier::get_or_create_source(&pool, "https://docs.example.com", "example")
        .await
        .unwrap();

    let (created_at, updated_at): (i64, i64) =
        sqlx::query_as("SELECT created_at, updated_at FROM sources WHERE id = ?")
            .bind(&id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(updated_at > 100, "updated_at should be refreshed");
    assert!(created_at > 0);
}

#[tokio::test]
async fn distinct_sources_get_distinct_ids() {
    let (_tmp, _cfg, pool) = setup().await;

    let a = frontier::get_or_create_source(&pool, "https://a.example.com", "a")
        .await
        .unwrap();
    let b = frontier::get_or_create_source(&pool, "https://b.example.com", "b")
        .await
        .unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn discover_never_duplicates_urls() {
    let (_tmp, _cfg, pool) = setup().await;

    let source_id = frontier::get_or_create_source(&pool, "https://docs.example.com", "example")
        .await
        .unwrap();

    let batch_one = vec![
        "https://docs.example.com/a".to_string(),
        "https://docs.example.com/b".to_string(),
    ];
    let batch_two = vec![
        "https://docs.example.com/b".to_string(),
        "https://docs.example.com/c".to_string(),
    ];

    let mut tx = pool.begin().await.unwrap();
    let ids_one = frontier::discover(&mut tx, &source_id, &batch_one).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    let ids_two = frontier::discover(&mut tx, &source_id, &batch_two).await.unwrap();
    tx.commit().await.unwrap();

    // Overlapping URL resolves to the same record.
    assert_eq!(ids_one[1], ids_two[0]);

    // Distinct records == distinct URL strings ever submitted.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM urls")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn discover_preserves_the_scraped_flag() {
    let (_tmp, _cfg, pool) = setup().await;

    let source_id = frontier::get_or_create_source(&pool, "https://docs.example.com", "example")
        .await
        .unwrap();

    let urls = vec!["https://docs.example.com/a".to_string()];

    let mut tx = pool.begin().await.unwrap();
    let ids = frontier::discover(&mut tx, &source_id, &urls).await.unwrap();
    frontier::mark_scraped(&mut tx, &ids[0]).await.unwrap();
    tx.commit().await.unwrap();

    // Rediscovery must not reset the flag.
    let mut tx = pool.begin().await.unwrap();
    frontier::discover(&mut tx, &source_id, &urls).await.unwrap();
    tx.commit().await.unwrap();

    assert!(frontier::is_scraped(&pool, &ids[0]).await.unwrap());
}

#[tokio::test]
async fn mark_scraped_is_idempotent_and_one_directional() {
    let (_tmp, _cfg, pool) = setup().await;

    let source_id = frontier::get_or_create_source(&pool, "https://docs.example.com", "example")
        .await
        .unwrap();

    let mut tx = pool.begin().await.unwrap();
    let ids = frontier::discover(
        &mut tx,
        &source_id,
        &["https://docs.example.com/a".to_string()],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    frontier::mark_scraped(&mut tx, &ids[0]).await.unwrap();
    // Marking twice is a silent no-op, supporting at-least-once fetches.
    frontier::mark_scraped(&mut tx, &ids[0]).await.unwrap();
    tx.commit().await.unwrap();

    assert!(frontier::is_scraped(&pool, &ids[0]).await.unwrap());
}

#[tokio::test]
async fn next_unscraped_is_the_pending_work_queue() {
    let (_tmp, _cfg, pool) = setup().await;

    let source_id = frontier::get_or_create_source(&pool, "https://docs.example.com", "example")
        .await
        .unwrap();

    let urls: Vec<String> = (0..4)
        .map(|i| format!("https://docs.example.com/p{i}"))
        .collect();

    let mut tx = pool.begin().await.unwrap();
    let ids = frontier::discover(&mut tx, &source_id, &urls).await.unwrap();
    tx.commit().await.unwrap();

    let pending = frontier::next_unscraped(&pool, &source_id).await.unwrap();
    assert_eq!(pending.len(), 4);
    assert!(pending.iter().all(|r| !r.scraped && r.source_id == source_id));

    let mut tx = pool.begin().await.unwrap();
    frontier::mark_scraped(&mut tx, &ids[0]).await.unwrap();
    frontier::mark_scraped(&mut tx, &ids[2]).await.unwrap();
    tx.commit().await.unwrap();

    // Re-read sees only what is still pending, in insertion order.
    let pending = frontier::next_unscraped(&pool, &source_id).await.unwrap();
    let pending_urls: Vec<&str> = pending.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        pending_urls,
        vec!["https://docs.example.com/p1", "https://docs.example.com/p3"]
    );

    // Mid-pass discovery lands in the next read.
    let mut tx = pool.begin().await.unwrap();
    frontier::discover(
        &mut tx,
        &source_id,
        &["https://docs.example.com/late".to_string()],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let pending = frontier::next_unscraped(&pool, &source_id).await.unwrap();
    assert_eq!(pending.len(), 3);
}

#[tokio::test]
async fn urls_are_scoped_to_their_source() {
    let (_tmp, _cfg, pool) = setup().await;

    let a = frontier::get_or_create_source(&pool, "https://a.example.com", "a")
        .await
        .unwrap();
    let b = frontier::get_or_create_source(&pool, "https://b.example.com", "b")
        .await
        .unwrap();

    let mut tx = pool.begin().await.unwrap();
    frontier::discover(&mut tx, &a, &["https://a.example.com/x".to_string()])
        .await
        .unwrap();
    frontier::discover(&mut tx, &b, &["https://b.example.com/y".to_string()])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let pending_a = frontier::next_unscraped(&pool, &a).await.unwrap();
    assert_eq!(pending_a.len(), 1);
    assert_eq!(pending_a[0].url, "https://a.example.com/x");
}
