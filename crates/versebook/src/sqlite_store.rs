//! SQLite-backed [`CorpusStore`].
//!
//! Lexical search goes through the `verses_fts` FTS5 table (porter-stemmed
//! BM25); everything else is plain table access. The embedding index is
//! persisted across `verse_vectors` plus one `embedding_index` metadata row
//! per model; the metadata row is written last inside the save transaction,
//! so an interrupted save never leaves a loadable half-index.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use versebook_core::embedding::{blob_to_vec, vec_to_blob};
use versebook_core::error::{Result, SearchError};
use versebook_core::models::{EmbeddingRecord, EngineHit, VerseMeta};
use versebook_core::store::{fingerprint_verses, CorpusStore, StoredIndex};

pub struct SqliteCorpusStore {
    pool: SqlitePool,
}

impl SqliteCorpusStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn verse_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verses")
            .fetch_one(&self.pool)
            .await
            .context("count verses")?;
        Ok(count)
    }
}

/// Quote each token so user input is matched literally instead of being
/// parsed as FTS5 query syntax (`AND`, `NEAR`, `*`, column filters), and
/// join with `OR` so a verse missing one query token still matches. BM25
/// ranks fuller overlap higher, so partial matches sort below full ones.
fn fts_match_expr(query: &str) -> String {
    query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn row_to_verse(row: &sqlx::sqlite::SqliteRow) -> VerseMeta {
    VerseMeta {
        id: row.get("id"),
        translation: row.get("translation"),
        book: row.get("book"),
        book_order: row.get("book_order"),
        chapter: row.get("chapter"),
        verse: row.get("verse"),
        text: row.get("text"),
    }
}

#[async_trait]
impl CorpusStore for SqliteCorpusStore {
    async fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<EngineHit>> {
        if self.verse_count().await? == 0 {
            return Err(SearchError::IndexNotBuilt);
        }

        let match_expr = fts_match_expr(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT verse_id, rank
            FROM verses_fts
            WHERE verses_fts MATCH ?1
            ORDER BY rank
            LIMIT ?2
            "#,
        )
        .bind(&match_expr)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("FTS query failed")?;

        // SQLite's rank is negative BM25 (more negative = better), so the
        // negation gives a higher-is-better raw score.
        Ok(rows
            .iter()
            .map(|row| EngineHit {
                verse_id: row.get("verse_id"),
                raw_score: -row.get::<f64, _>("rank"),
            })
            .collect())
    }

    async fn all_verses(&self) -> Result<Vec<VerseMeta>> {
        let rows = sqlx::query(
            r#"
            SELECT id, translation, book, book_order, chapter, verse, text
            FROM verses
            ORDER BY translation, book_order, chapter, verse
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("load verses")?;

        Ok(rows.iter().map(row_to_verse).collect())
    }

    async fn verse_meta(&self, id: &str) -> Result<Option<VerseMeta>> {
        let row = sqlx::query(
            r#"
            SELECT id, translation, book, book_order, chapter, verse, text
            FROM verses
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("load verse")?;

        Ok(row.as_ref().map(row_to_verse))
    }

    async fn corpus_fingerprint(&self) -> Result<String> {
        let verses = self.all_verses().await?;
        Ok(fingerprint_verses(&verses))
    }

    async fn load_embedding_index(&self, model: &str) -> Result<Option<StoredIndex>> {
        let meta = sqlx::query(
            "SELECT dims, fingerprint, built_at FROM embedding_index WHERE model = ?1",
        )
        .bind(model)
        .fetch_optional(&self.pool)
        .await
        .context("load embedding index metadata")?;

        let Some(meta) = meta else {
            return Ok(None);
        };
        let dims: i64 = meta.get("dims");
        let dims = dims as usize;

        let rows = sqlx::query("SELECT verse_id, vector FROM verse_vectors WHERE model = ?1")
            .bind(model)
            .fetch_all(&self.pool)
            .await
            .context("load verse vectors")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("vector");
            let vector = blob_to_vec(&blob);
            if vector.len() != dims {
                // Truncated or foreign blob; report the whole index absent
                // and let the caller rebuild.
                tracing::warn!(model, "verse vector has wrong dimensionality; ignoring persisted index");
                return Ok(None);
            }
            records.push(EmbeddingRecord {
                verse_id: row.get("verse_id"),
                vector,
            });
        }

        Ok(Some(StoredIndex {
            dims,
            fingerprint: meta.get("fingerprint"),
            built_at: meta.get("built_at"),
            records,
        }))
    }

    async fn save_embedding_index(&self, model: &str, index: &StoredIndex) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin save transaction")?;

        sqlx::query("DELETE FROM verse_vectors WHERE model = ?1")
            .bind(model)
            .execute(&mut *tx)
            .await
            .context("clear old vectors")?;

        for record in &index.records {
            sqlx::query("INSERT INTO verse_vectors (verse_id, model, vector) VALUES (?1, ?2, ?3)")
                .bind(&record.verse_id)
                .bind(model)
                .bind(vec_to_blob(&record.vector))
                .execute(&mut *tx)
                .await
                .context("insert verse vector")?;
        }

        // Metadata last: the index only becomes loadable once this row lands.
        sqlx::query(
            r#"
            INSERT INTO embedding_index (model, dims, fingerprint, built_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(model) DO UPDATE SET
                dims = excluded.dims,
                fingerprint = excluded.fingerprint,
                built_at = excluded.built_at
            "#,
        )
        .bind(model)
        .bind(index.dims as i64)
        .bind(&index.fingerprint)
        .bind(index.built_at)
        .execute(&mut *tx)
        .await
        .context("write embedding index metadata")?;

        tx.commit().await.context("commit embedding index")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_match_expr_quotes_and_ors_tokens() {
        assert_eq!(
            fts_match_expr("love AND mercy"),
            r#""love" OR "AND" OR "mercy""#
        );
        assert_eq!(fts_match_expr(r#"say "hello""#), r#""say" OR "hello""#);
        assert_eq!(fts_match_expr("   "), "");
    }
}
