//! Retrieval engines and the registry the orchestrator draws from.
//!
//! Every strategy is an [`Engine`]: give it a query and a candidate count,
//! get back raw-scored hits. Raw scores are strategy-specific (term
//! frequency, edit similarity, cosine similarity) and are only comparable
//! after the orchestrator normalizes them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::fuzzy;
use crate::index::EmbeddingIndex;
use crate::models::{EngineHit, Strategy};
use crate::store::CorpusStore;
use crate::topic::TopicMap;

/// A single retrieval strategy.
#[async_trait]
pub trait Engine: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Return up to `k` candidates with raw, engine-specific scores.
    /// No matches is `Ok(vec![])`, not an error.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<EngineHit>>;
}

/// Registry of available engines, keyed by strategy.
#[derive(Default)]
pub struct EngineSet {
    engines: BTreeMap<Strategy, Arc<dyn Engine>>,
}

impl EngineSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine, replacing any previous one for its strategy.
    pub fn register(&mut self, engine: Arc<dyn Engine>) {
        self.engines.insert(engine.strategy(), engine);
    }

    pub fn get(&self, strategy: Strategy) -> Option<&Arc<dyn Engine>> {
        self.engines.get(&strategy)
    }

    /// Registered strategies in declaration order.
    pub fn strategies(&self) -> Vec<Strategy> {
        // BTreeMap iteration gives Strategy's derived order, which is the
        // fixed invocation order: exact, fuzzy, semantic, topic.
        self.engines.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Lexical full-text search, delegated to the store's ranked index.
pub struct ExactEngine {
    store: Arc<dyn CorpusStore>,
}

impl ExactEngine {
    pub fn new(store: Arc<dyn CorpusStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Engine for ExactEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Exact
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<EngineHit>> {
        self.store.lexical_search(query, k).await
    }
}

/// Typo-tolerant search: scores every verse with token-level edit distance.
pub struct FuzzyEngine {
    store: Arc<dyn CorpusStore>,
    cutoff: f64,
}

impl FuzzyEngine {
    pub fn new(store: Arc<dyn CorpusStore>, cutoff: f64) -> Self {
        Self { store, cutoff }
    }
}

#[async_trait]
impl Engine for FuzzyEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Fuzzy
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<EngineHit>> {
        let verses = self.store.all_verses().await?;
        let mut hits = fuzzy::match_verses(query, &verses, self.cutoff);
        hits.truncate(k);
        Ok(hits)
    }
}

/// Embedding-similarity search. Triggers an index build on first use.
pub struct SemanticEngine {
    store: Arc<dyn CorpusStore>,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn Embedder>,
}

impl SemanticEngine {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }
}

#[async_trait]
impl Engine for SemanticEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Semantic
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<EngineHit>> {
        let built = self
            .index
            .ensure_ready(self.store.as_ref(), self.embedder.as_ref())
            .await?;
        let vectors = self.embedder.embed_batch(&[query.to_string()]).await?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for query"))?;
        Ok(built.knn(&query_vec, k))
    }
}

/// Theme search: expands the query through a [`TopicMap`] and runs each
/// representative phrase through the embedding index, keeping the best
/// similarity per verse.
pub struct TopicEngine {
    store: Arc<dyn CorpusStore>,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn Embedder>,
    topics: TopicMap,
}

impl TopicEngine {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn Embedder>,
        topics: TopicMap,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            topics,
        }
    }
}

#[async_trait]
impl Engine for TopicEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Topic
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<EngineHit>> {
        let built = self
            .index
            .ensure_ready(self.store.as_ref(), self.embedder.as_ref())
            .await?;

        let phrases = self.topics.expand(query);
        let vectors = self.embedder.embed_batch(&phrases).await?;

        // Best similarity per verse across all phrase probes.
        let mut best: BTreeMap<String, f64> = BTreeMap::new();
        for vec in &vectors {
            for hit in built.knn(vec, k) {
                let entry = best.entry(hit.verse_id).or_insert(f64::NEG_INFINITY);
                if hit.raw_score > *entry {
                    *entry = hit.raw_score;
                }
            }
        }

        let mut hits: Vec<EngineHit> = best
            .into_iter()
            .map(|(verse_id, raw_score)| EngineHit {
                verse_id,
                raw_score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{verse_id, VerseMeta};
    use crate::store::memory::MemoryCorpusStore;

    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        fn model_name(&self) -> &str {
            "hash-embedder"
        }

        fn dims(&self) -> usize {
            8
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = [0.0f32; 8];
                    for token in t.to_lowercase().split_whitespace() {
                        let mut h = 0usize;
                        for b in token.bytes() {
                            h = h.wrapping_mul(31).wrapping_add(b as usize);
                        }
                        v[h % 8] += 1.0;
                    }
                    v.to_vec()
                })
                .collect())
        }
    }

    fn verse(book: &str, chapter: i64, num: i64, text: &str) -> VerseMeta {
        VerseMeta {
            id: verse_id("T", book, chapter, num),
            translation: "T".to_string(),
            book: book.to_string(),
            book_order: 0,
            chapter,
            verse: num,
            text: text.to_string(),
        }
    }

    fn corpus() -> Vec<VerseMeta> {
        vec![
            verse("Genesis", 1, 1, "In the beginning God created the heaven and the earth"),
            verse("Genesis", 1, 3, "And God said let there be light and there was light"),
            verse("Matthew", 5, 9, "Blessed are the peacemakers"),
        ]
    }

    #[tokio::test]
    async fn test_exact_engine_delegates_to_store() {
        let store: Arc<dyn CorpusStore> = Arc::new(MemoryCorpusStore::new(corpus()));
        let engine = ExactEngine::new(store);
        let hits = engine.search("light", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].verse_id, "T:Genesis:1:3");
    }

    #[tokio::test]
    async fn test_fuzzy_engine_tolerates_typos() {
        let store: Arc<dyn CorpusStore> = Arc::new(MemoryCorpusStore::new(corpus()));
        let engine = FuzzyEngine::new(store, 0.3);
        let hits = engine.search("blssed peacemakrs", 10).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].verse_id, "T:Matthew:5:9");
    }

    #[tokio::test]
    async fn test_semantic_engine_builds_and_ranks() {
        let store: Arc<dyn CorpusStore> = Arc::new(MemoryCorpusStore::new(corpus()));
        let index = Arc::new(EmbeddingIndex::new(16));
        let engine = SemanticEngine::new(store, Arc::clone(&index), Arc::new(HashEmbedder));

        let hits = engine
            .search("In the beginning God created the heaven and the earth", 3)
            .await
            .unwrap();
        assert_eq!(hits[0].verse_id, "T:Genesis:1:1");
        assert!(hits[0].raw_score > 0.9);
    }

    #[tokio::test]
    async fn test_topic_engine_expands_known_topic() {
        let store: Arc<dyn CorpusStore> = Arc::new(MemoryCorpusStore::new(corpus()));
        let index = Arc::new(EmbeddingIndex::new(16));
        let mut topics = TopicMap::new();
        topics.insert("creation", &["God created the heaven and the earth"]);
        let engine = TopicEngine::new(store, index, Arc::new(HashEmbedder), topics);

        let hits = engine.search("creation", 3).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].verse_id, "T:Genesis:1:1");
    }

    #[tokio::test]
    async fn test_engine_set_fixed_order() {
        let store: Arc<dyn CorpusStore> = Arc::new(MemoryCorpusStore::new(corpus()));
        let mut set = EngineSet::new();
        set.register(Arc::new(FuzzyEngine::new(Arc::clone(&store), 0.7)));
        set.register(Arc::new(ExactEngine::new(store)));
        assert_eq!(set.strategies(), vec![Strategy::Exact, Strategy::Fuzzy]);
    }
}
