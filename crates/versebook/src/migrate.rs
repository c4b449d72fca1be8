use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Create verses table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verses (
            id TEXT PRIMARY KEY,
            translation TEXT NOT NULL,
            book TEXT NOT NULL,
            book_order INTEGER NOT NULL,
            chapter INTEGER NOT NULL,
            verse INTEGER NOT NULL,
            text TEXT NOT NULL,
            UNIQUE(translation, book, chapter, verse)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create FTS5 virtual table over verse text.
    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='verses_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE verses_fts USING fts5(
                verse_id UNINDEXED,
                text,
                tokenize='porter unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Create verse_vectors table (one row per verse per embedding model)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verse_vectors (
            verse_id TEXT NOT NULL,
            model TEXT NOT NULL,
            vector BLOB NOT NULL,
            PRIMARY KEY (verse_id, model)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create embedding_index metadata table. A row here marks the vectors
    // for its model as complete; it is written last during a build so a
    // crash mid-build leaves no valid index.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_index (
            model TEXT PRIMARY KEY,
            dims INTEGER NOT NULL,
            fingerprint TEXT NOT NULL,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_verses_canonical ON verses(translation, book_order, chapter, verse)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_verses_translation ON verses(translation)")
        .execute(pool)
        .await?;

    Ok(())
}
