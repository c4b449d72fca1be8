//! Embedding index lifecycle: `Unbuilt → Building → Ready`, with
//! `Stale → Building` when the corpus fingerprint no longer matches.
//!
//! The full embedding pass is the one expensive, once-per-corpus-version
//! operation in the system. [`EmbeddingIndex::ensure_ready`] guards it with
//! an async mutex so at most one build runs per process: callers that
//! arrive mid-build await the winner and share its result. A persisted
//! index whose fingerprint matches the live corpus short-circuits the
//! build entirely; a crash mid-build leaves no usable metadata, so the next
//! start treats the index as `Unbuilt` and any partial artifact is ignored.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::models::{EmbeddingRecord, EngineHit};
use crate::store::{CorpusStore, StoredIndex};

/// Lifecycle state of the embedding index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No vectors exist yet; the first semantic query triggers a build.
    Unbuilt,
    /// An embedding pass is in progress.
    Building,
    /// Vectors are loaded and match the current corpus.
    Ready,
    /// Vectors exist but were built from a different corpus version.
    Stale,
}

/// An immutable, fully built embedding index.
///
/// k-NN queries use cosine similarity — the same metric the build used to
/// define the space. Mixing metrics between build and query time is a
/// correctness bug, not a tuning choice.
pub struct BuiltIndex {
    pub model: String,
    pub dims: usize,
    pub fingerprint: String,
    pub built_at: i64,
    records: Vec<EmbeddingRecord>,
}

impl BuiltIndex {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Return the `k` closest verses to `query_vec` by cosine similarity,
    /// best first. An empty index yields an empty list.
    pub fn knn(&self, query_vec: &[f32], k: usize) -> Vec<EngineHit> {
        let mut hits: Vec<EngineHit> = self
            .records
            .iter()
            .map(|r| EngineHit {
                verse_id: r.verse_id.clone(),
                raw_score: f64::from(cosine_similarity(query_vec, &r.vector)),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }

    fn to_stored(&self) -> StoredIndex {
        StoredIndex {
            dims: self.dims,
            fingerprint: self.fingerprint.clone(),
            built_at: self.built_at,
            records: self.records.clone(),
        }
    }

    fn from_stored(model: &str, stored: StoredIndex) -> Self {
        Self {
            model: model.to_string(),
            dims: stored.dims,
            fingerprint: stored.fingerprint,
            built_at: stored.built_at,
            records: stored.records,
        }
    }
}

struct Slot {
    state: IndexState,
    built: Option<Arc<BuiltIndex>>,
}

/// Owned, injectable embedding index with explicit lifecycle.
///
/// One instance is shared (via `Arc`) by the semantic and topic engines.
pub struct EmbeddingIndex {
    batch_size: usize,
    slot: RwLock<Slot>,
    build_lock: Mutex<()>,
}

impl EmbeddingIndex {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            slot: RwLock::new(Slot {
                state: IndexState::Unbuilt,
                built: None,
            }),
            build_lock: Mutex::new(()),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> IndexState {
        self.slot.read().await.state
    }

    /// Lifecycle state relative to the live corpus: an in-memory index
    /// whose fingerprint or model no longer matches reports `Stale`.
    pub async fn status(&self, store: &dyn CorpusStore, model: &str) -> Result<IndexState> {
        let fingerprint = store.corpus_fingerprint().await?;
        let slot = self.slot.read().await;
        Ok(match (&slot.built, slot.state) {
            (_, IndexState::Building) => IndexState::Building,
            (Some(b), _) if b.fingerprint == fingerprint && b.model == model => IndexState::Ready,
            (Some(_), _) => IndexState::Stale,
            (None, _) => IndexState::Unbuilt,
        })
    }

    /// Return a `Ready` index for the current corpus, building it if
    /// necessary. Concurrent callers never trigger a duplicate build.
    pub async fn ensure_ready(
        &self,
        store: &dyn CorpusStore,
        embedder: &dyn Embedder,
    ) -> Result<Arc<BuiltIndex>> {
        let fingerprint = store.corpus_fingerprint().await?;

        // Fast path: already built for this corpus version.
        if let Some(built) = self.current(&fingerprint, embedder.model_name()).await {
            return Ok(built);
        }

        let _guard = self.build_lock.lock().await;

        // Re-check: another caller may have finished the build while we
        // waited on the lock.
        if let Some(built) = self.current(&fingerprint, embedder.model_name()).await {
            return Ok(built);
        }

        {
            let mut slot = self.slot.write().await;
            slot.state = IndexState::Building;
        }

        match self.build(store, embedder, &fingerprint).await {
            Ok(built) => {
                let built = Arc::new(built);
                let mut slot = self.slot.write().await;
                slot.state = IndexState::Ready;
                slot.built = Some(Arc::clone(&built));
                Ok(built)
            }
            Err(e) => {
                let mut slot = self.slot.write().await;
                slot.state = IndexState::Unbuilt;
                slot.built = None;
                Err(e)
            }
        }
    }

    async fn current(&self, fingerprint: &str, model: &str) -> Option<Arc<BuiltIndex>> {
        let slot = self.slot.read().await;
        slot.built
            .as_ref()
            .filter(|b| b.fingerprint == fingerprint && b.model == model)
            .cloned()
    }

    async fn build(
        &self,
        store: &dyn CorpusStore,
        embedder: &dyn Embedder,
        fingerprint: &str,
    ) -> Result<BuiltIndex> {
        let model = embedder.model_name();

        // A persisted index for the same corpus version makes the
        // embedding pass unnecessary.
        match store.load_embedding_index(model).await? {
            Some(stored) if stored.fingerprint == fingerprint && stored.dims == embedder.dims() => {
                tracing::debug!(model, records = stored.records.len(), "loaded persisted embedding index");
                return Ok(BuiltIndex::from_stored(model, stored));
            }
            Some(_) => {
                tracing::info!(model, "persisted embedding index is stale; rebuilding");
            }
            None => {}
        }

        let verses = store.all_verses().await?;
        tracing::info!(model, verses = verses.len(), "building embedding index");

        let mut records = Vec::with_capacity(verses.len());
        for batch in verses.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|v| v.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            for (v, vector) in batch.iter().zip(vectors) {
                records.push(EmbeddingRecord {
                    verse_id: v.id.clone(),
                    vector,
                });
            }
        }

        let built = BuiltIndex {
            model: model.to_string(),
            dims: embedder.dims(),
            fingerprint: fingerprint.to_string(),
            built_at: chrono::Utc::now().timestamp(),
            records,
        };

        store.save_embedding_index(model, &built.to_stored()).await?;
        tracing::info!(model, records = built.len(), "embedding index ready");
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::models::{verse_id, VerseMeta};
    use crate::store::memory::MemoryCorpusStore;

    /// Deterministic embedder: counts batch calls so tests can assert
    /// that the fingerprint short-circuit avoids a second pass.
    pub(crate) struct CountingEmbedder {
        pub calls: AtomicUsize,
    }

    impl CountingEmbedder {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "stub-embedder"
        }

        fn dims(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    // Crude but stable: character-class histogram.
                    let mut v = [0.0f32; 4];
                    for c in t.chars() {
                        v[(c as usize) % 4] += 1.0;
                    }
                    v.to_vec()
                })
                .collect())
        }
    }

    fn verse(num: i64, text: &str) -> VerseMeta {
        VerseMeta {
            id: verse_id("T", "Book", 1, num),
            translation: "T".to_string(),
            book: "Book".to_string(),
            book_order: 0,
            chapter: 1,
            verse: num,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_then_ready() {
        let store = MemoryCorpusStore::new(vec![verse(1, "alpha"), verse(2, "beta")]);
        let index = EmbeddingIndex::new(8);
        let embedder = CountingEmbedder::new();

        assert_eq!(index.state().await, IndexState::Unbuilt);
        let built = index.ensure_ready(&store, &embedder).await.unwrap();
        assert_eq!(index.state().await, IndexState::Ready);
        assert_eq!(built.len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_corpus_skips_second_pass() {
        let store = MemoryCorpusStore::new(vec![verse(1, "alpha"), verse(2, "beta")]);
        let embedder = CountingEmbedder::new();

        let first = EmbeddingIndex::new(8);
        first.ensure_ready(&store, &embedder).await.unwrap();
        let calls_after_build = embedder.calls.load(Ordering::SeqCst);
        assert!(calls_after_build > 0);

        // Fresh in-process index, same persisted store: the fingerprint
        // match must short-circuit the embedding pass.
        let second = EmbeddingIndex::new(8);
        let built = second.ensure_ready(&store, &embedder).await.unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_build);
        assert_eq!(second.state().await, IndexState::Ready);
    }

    #[tokio::test]
    async fn test_changed_corpus_rebuilds() {
        let embedder = CountingEmbedder::new();

        let store_a = MemoryCorpusStore::new(vec![verse(1, "alpha")]);
        let index = EmbeddingIndex::new(8);
        index.ensure_ready(&store_a, &embedder).await.unwrap();
        let calls = embedder.calls.load(Ordering::SeqCst);

        // Same index instance, different corpus content.
        let store_b = MemoryCorpusStore::new(vec![verse(1, "omega")]);
        assert_eq!(
            index.status(&store_b, embedder.model_name()).await.unwrap(),
            IndexState::Stale
        );
        index.ensure_ready(&store_b, &embedder).await.unwrap();
        assert!(embedder.calls.load(Ordering::SeqCst) > calls);
        assert_eq!(
            index.status(&store_b, embedder.model_name()).await.unwrap(),
            IndexState::Ready
        );
    }

    #[tokio::test]
    async fn test_empty_corpus_builds_empty_index() {
        let store = MemoryCorpusStore::new(Vec::new());
        let index = EmbeddingIndex::new(8);
        let embedder = CountingEmbedder::new();

        let built = index.ensure_ready(&store, &embedder).await.unwrap();
        assert!(built.is_empty());
        assert_eq!(index.state().await, IndexState::Ready);
        assert!(built.knn(&[1.0, 0.0, 0.0, 0.0], 5).is_empty());
    }

    #[tokio::test]
    async fn test_knn_orders_by_similarity() {
        let store = MemoryCorpusStore::new(vec![verse(1, "aaaa"), verse(2, "bbbb")]);
        let index = EmbeddingIndex::new(8);
        let embedder = CountingEmbedder::new();
        let built = index.ensure_ready(&store, &embedder).await.unwrap();

        let query = embedder
            .embed_batch(&["aaaa".to_string()])
            .await
            .unwrap()
            .remove(0);
        let hits = built.knn(&query, 2);
        assert_eq!(hits[0].verse_id, "T:Book:1:1");
        assert!(hits[0].raw_score >= hits[1].raw_score);
    }
}
