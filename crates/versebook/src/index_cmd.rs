//! `vrs index build` and `vrs index status`.

use std::sync::Arc;

use anyhow::{bail, Result};
use sqlx::Row;

use versebook_core::index::EmbeddingIndex;
use versebook_core::store::CorpusStore;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteCorpusStore;

/// Build (or refresh) the embedding index for the configured model.
pub async fn run_index_build(config: &Config) -> Result<()> {
    let Some(embedder) = create_provider(&config.embedding)? else {
        bail!("embedding.provider is 'disabled'; configure a provider to build the index");
    };

    let pool = db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;
    let store = Arc::new(SqliteCorpusStore::new(pool));

    let index = EmbeddingIndex::new(config.embedding.batch_size);
    let built = index
        .ensure_ready(store.as_ref(), embedder.as_ref())
        .await?;

    println!(
        "Embedding index ready: {} vectors, model {}, {} dims.",
        built.len(),
        built.model,
        built.dims
    );
    Ok(())
}

/// Report the persisted index state for each model: `ready` when its
/// fingerprint matches the live corpus, `stale` otherwise, or `unbuilt`
/// when no index row exists.
pub async fn run_index_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;
    let store = SqliteCorpusStore::new(pool);

    let current = store.corpus_fingerprint().await?;

    let rows = sqlx::query("SELECT model, dims, built_at FROM embedding_index ORDER BY model")
        .fetch_all(store.pool())
        .await?;

    if rows.is_empty() {
        println!("No embedding index built.");
        return Ok(());
    }

    for row in &rows {
        let model: String = row.get("model");
        let dims: i64 = row.get("dims");
        let built_at: i64 = row.get("built_at");

        let state = match store.load_embedding_index(&model).await? {
            Some(stored) if stored.fingerprint == current => "ready",
            Some(_) => "stale",
            None => "unbuilt",
        };

        let built = chrono::DateTime::from_timestamp(built_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| built_at.to_string());
        println!("{}  dims={}  built={}  {}", model, dims, built, state);
    }

    Ok(())
}
