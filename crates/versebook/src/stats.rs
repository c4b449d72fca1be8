//! `vrs stats` — corpus and index counts.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;

    let rows = sqlx::query(
        r#"
        SELECT translation,
               COUNT(DISTINCT book) AS books,
               COUNT(*) AS verses
        FROM verses
        GROUP BY translation
        ORDER BY translation
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if rows.is_empty() {
        println!("Corpus is empty. Run `vrs ingest <file>` first.");
    } else {
        for row in &rows {
            println!(
                "{}: {} books, {} verses",
                row.get::<String, _>("translation"),
                row.get::<i64, _>("books"),
                row.get::<i64, _>("verses")
            );
        }
    }

    let index_rows =
        sqlx::query("SELECT model, COUNT(*) AS n FROM verse_vectors GROUP BY model ORDER BY model")
            .fetch_all(&pool)
            .await?;
    for row in &index_rows {
        println!(
            "embedding index '{}': {} vectors",
            row.get::<String, _>("model"),
            row.get::<i64, _>("n")
        );
    }

    pool.close().await;
    Ok(())
}
