//! Storage abstraction for the verse corpus.
//!
//! The [`CorpusStore`] trait defines every storage operation the engines and
//! the orchestrator need, enabling pluggable backends (SQLite in the
//! application crate, in-memory here for tests). The corpus is treated as
//! read-only for the lifetime of a search session; the only writer is the
//! embedding-index build, which goes through
//! [`save_embedding_index`](CorpusStore::save_embedding_index).
//!
//! Implementations must be `Send + Sync`.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EmbeddingRecord, EngineHit, VerseMeta};

/// A persisted embedding index: vectors plus the metadata needed to decide
/// whether it is still valid for the live corpus.
#[derive(Debug, Clone)]
pub struct StoredIndex {
    /// Vector dimensionality.
    pub dims: usize,
    /// SHA-256 fingerprint of the corpus the vectors were built from.
    pub fingerprint: String,
    /// Unix timestamp of the build.
    pub built_at: i64,
    pub records: Vec<EmbeddingRecord>,
}

/// Abstract storage backend for the verse corpus.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`lexical_search`](CorpusStore::lexical_search) | Ranked full-text search over verse text |
/// | [`all_verses`](CorpusStore::all_verses) | Every verse in canonical order |
/// | [`verse_meta`](CorpusStore::verse_meta) | Lookup one verse for result enrichment |
/// | [`corpus_fingerprint`](CorpusStore::corpus_fingerprint) | Content hash for index invalidation |
/// | [`load_embedding_index`](CorpusStore::load_embedding_index) | Load persisted vectors for a model |
/// | [`save_embedding_index`](CorpusStore::save_embedding_index) | Persist vectors + fingerprint atomically |
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Token-based ranked search over verse text. Fails with
    /// [`SearchError::IndexNotBuilt`](crate::SearchError::IndexNotBuilt)
    /// when no corpus has been ingested.
    async fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<EngineHit>>;

    /// All verses in canonical corpus order (book order, chapter, verse).
    async fn all_verses(&self) -> Result<Vec<VerseMeta>>;

    /// Look up a single verse by id.
    async fn verse_meta(&self, id: &str) -> Result<Option<VerseMeta>>;

    /// SHA-256 over the ordered verse ids and texts. Changes whenever the
    /// corpus content changes, invalidating any persisted embedding index.
    async fn corpus_fingerprint(&self) -> Result<String>;

    /// Load the persisted embedding index for `model`, if one exists.
    /// A partial or unreadable artifact is reported as absent.
    async fn load_embedding_index(&self, model: &str) -> Result<Option<StoredIndex>>;

    /// Persist the embedding index for `model`, replacing any previous one.
    /// Must be atomic: a crash mid-save leaves either the old index or none.
    async fn save_embedding_index(&self, model: &str, index: &StoredIndex) -> Result<()>;
}

/// Compute the corpus fingerprint from verses in canonical order.
///
/// Shared by store implementations so SQLite and in-memory corpora with the
/// same content produce the same fingerprint.
pub fn fingerprint_verses<'a>(verses: impl IntoIterator<Item = &'a VerseMeta>) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for v in verses {
        hasher.update(v.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(v.text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
