use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// List registered sources with their frontier progress.
pub async fn list_sources(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT sources.root_url, sources.name,
               COUNT(urls.id) AS total,
               COALESCE(SUM(urls.scraped), 0) AS scraped
        FROM sources
        LEFT JOIN urls ON urls.source_id = sources.id
        GROUP BY sources.id
        ORDER BY sources.created_at
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if rows.is_empty() {
        println!("No sources registered. Run `docrag crawl <url>` first.");
        pool.close().await;
        return Ok(());
    }

    println!("{:<40} {:<24} {:>8} {:>8}", "ROOT URL", "NAME", "URLS", "SCRAPED");
    for row in &rows {
        let root_url: String = row.get("root_url");
        let name: String = row.get("name");
        let total: i64 = row.get("total");
        let scraped: i64 = row.get("scraped");
        println!("{:<40} {:<24} {:>8} {:>8}", root_url, name, total, scraped);
    }

    pool.close().await;
    Ok(())
}
