//! In-memory [`CorpusStore`] implementation for tests and engine
//! substitution.
//!
//! Lexical search is a simple term-occurrence count over lowercased verse
//! text, which is enough to exercise the orchestrator's normalization and
//! fusion rules without an FTS index.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, SearchError};
use crate::models::{EngineHit, VerseMeta};

use super::{fingerprint_verses, CorpusStore, StoredIndex};

/// In-memory corpus store. Verses are fixed at construction; the persisted
/// embedding index lives behind an `RwLock` slot.
pub struct MemoryCorpusStore {
    verses: Vec<VerseMeta>,
    index: RwLock<Option<(String, StoredIndex)>>,
}

impl MemoryCorpusStore {
    /// Build a store from verses already in canonical order.
    pub fn new(verses: Vec<VerseMeta>) -> Self {
        Self {
            verses,
            index: RwLock::new(None),
        }
    }

    pub fn verse_count(&self) -> usize {
        self.verses.len()
    }
}

#[async_trait]
impl CorpusStore for MemoryCorpusStore {
    async fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<EngineHit>> {
        if self.verses.is_empty() {
            return Err(SearchError::IndexNotBuilt);
        }

        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<EngineHit> = self
            .verses
            .iter()
            .filter_map(|v| {
                let text_lower = v.text.to_lowercase();
                let matches: usize = terms
                    .iter()
                    .map(|t| text_lower.matches(t).count())
                    .sum();
                if matches > 0 {
                    Some(EngineHit {
                        verse_id: v.id.clone(),
                        raw_score: matches as f64,
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn all_verses(&self) -> Result<Vec<VerseMeta>> {
        Ok(self.verses.clone())
    }

    async fn verse_meta(&self, id: &str) -> Result<Option<VerseMeta>> {
        Ok(self.verses.iter().find(|v| v.id == id).cloned())
    }

    async fn corpus_fingerprint(&self) -> Result<String> {
        Ok(fingerprint_verses(&self.verses))
    }

    async fn load_embedding_index(&self, model: &str) -> Result<Option<StoredIndex>> {
        let guard = self.index.read().unwrap();
        Ok(guard
            .as_ref()
            .filter(|(m, _)| m == model)
            .map(|(_, idx)| idx.clone()))
    }

    async fn save_embedding_index(&self, model: &str, index: &StoredIndex) -> Result<()> {
        let mut guard = self.index.write().unwrap();
        *guard = Some((model.to_string(), index.clone()));
        Ok(())
    }
}
