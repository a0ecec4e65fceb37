//! URL frontier and crawl-state machine.
//!
//! Tracks every discovered URL through its lifecycle: `discovered` →
//! `scraped`. Discovery is idempotent — the UNIQUE constraint on the
//! url column is the safety net, and a conflicting insert falls back
//! to reading the now-existing row instead of erroring. `scraped` is
//! one-directional: marking an already-scraped URL is a silent no-op,
//! which is what gives fetches at-least-once semantics.

use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::UrlRecord;

/// Idempotent source registration keyed by root URL.
///
/// Re-registering an existing root URL refreshes its `updated_at` and
/// returns the existing id; concurrent callers racing on the insert
/// converge on the same row through the unique constraint.
pub async fn get_or_create_source(pool: &SqlitePool, root_url: &str, name: &str) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO sources (id, root_url, name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(root_url) DO UPDATE SET updated_at = excluded.updated_at
        "#,
    )
    .bind(&id)
    .bind(root_url)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    // Re-read rather than trusting our candidate id: on conflict the
    // existing row won.
    let source_id: String = sqlx::query_scalar("SELECT id FROM sources WHERE root_url = ?")
        .bind(root_url)
        .fetch_one(pool)
        .await
        .with_context(|| format!("Source row missing after upsert for {root_url}"))?;

    Ok(source_id)
}

/// Idempotently insert-or-fetch URL records under `source_id`,
/// returning the id of each submitted URL.
///
/// Never touches an existing record — in particular its `scraped`
/// flag and owning source survive rediscovery. Runs against a single
/// connection so callers can wrap a whole discovery batch in one
/// transaction.
pub async fn discover(
    conn: &mut SqliteConnection,
    source_id: &str,
    urls: &[String],
) -> Result<Vec<String>> {
    let mut ids = Vec::with_capacity(urls.len());

    for url in urls {
        sqlx::query(
            r#"
            INSERT INTO urls (id, source_id, url)
            VALUES (?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(source_id)
        .bind(url)
        .execute(&mut *conn)
        .await?;

        let id: String = sqlx::query_scalar("SELECT id FROM urls WHERE url = ?")
            .bind(url)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("URL row missing after insert for {url}"))?;

        ids.push(id);
    }

    Ok(ids)
}

/// The work queue: every URL of the source still awaiting capture.
///
/// Read fresh per crawl pass rather than held in memory, so discovery
/// that happens mid-pass (links found while scraping) feeds the next
/// pass.
pub async fn next_unscraped(pool: &SqlitePool, source_id: &str) -> Result<Vec<UrlRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, source_id, url, scraped
        FROM urls
        WHERE source_id = ? AND scraped = 0
        ORDER BY rowid
        "#,
    )
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| UrlRecord {
            id: row.get("id"),
            source_id: row.get("source_id"),
            url: row.get("url"),
            scraped: row.get::<i64, _>("scraped") != 0,
        })
        .collect())
}

/// One-directional transition to `scraped = true`. Re-marking an
/// already-scraped URL is a no-op, not an error.
pub async fn mark_scraped(conn: &mut SqliteConnection, url_id: &str) -> Result<()> {
    sqlx::query("UPDATE urls SET scraped = 1 WHERE id = ?")
        .bind(url_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn is_scraped(pool: &SqlitePool, url_id: &str) -> Result<bool> {
    let scraped: i64 = sqlx::query_scalar("SELECT scraped FROM urls WHERE id = ?")
        .bind(url_id)
        .fetch_one(pool)
        .await?;
    Ok(scraped != 0)
}
