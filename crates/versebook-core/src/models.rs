//! Core data models shared by the engines, the orchestrator, and the
//! application crate.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SearchError;

/// The atomic retrievable unit: one verse of one translation.
///
/// `(translation, book, chapter, verse)` uniquely identifies a verse;
/// [`verse_id`] derives the stable string id from that tuple. Chapter and
/// verse numbers are 1-based and may have gaps.
#[derive(Debug, Clone, Serialize)]
pub struct Verse {
    pub id: String,
    pub translation: String,
    pub book: String,
    pub chapter: i64,
    pub verse: i64,
    pub text: String,
}

/// A verse plus its canonical-ordering key.
///
/// `book_order` is the position of the book within its translation as
/// ingested. Together with chapter and verse number it defines canonical
/// corpus order, the tie-break for equal scores.
#[derive(Debug, Clone, Serialize)]
pub struct VerseMeta {
    pub id: String,
    pub translation: String,
    pub book: String,
    pub book_order: i64,
    pub chapter: i64,
    pub verse: i64,
    pub text: String,
}

impl VerseMeta {
    /// Canonical corpus position, used as the deterministic sort tie-break.
    pub fn canonical_key(&self) -> (i64, i64, i64) {
        (self.book_order, self.chapter, self.verse)
    }

    /// Human-readable reference, e.g. `Genesis 1:1`.
    pub fn reference(&self) -> String {
        format!("{} {}:{}", self.book, self.chapter, self.verse)
    }
}

/// Derive the stable verse id from its identifying tuple.
pub fn verse_id(translation: &str, book: &str, chapter: i64, verse: i64) -> String {
    format!("{}:{}:{}:{}", translation, book, chapter, verse)
}

/// Retrieval strategy tag. One engine implementation per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Exact,
    Fuzzy,
    Semantic,
    Topic,
}

impl Strategy {
    /// All strategies, in the fixed order engines are invoked.
    pub const ALL: [Strategy; 4] = [
        Strategy::Exact,
        Strategy::Fuzzy,
        Strategy::Semantic,
        Strategy::Topic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Exact => "exact",
            Strategy::Fuzzy => "fuzzy",
            Strategy::Semantic => "semantic",
            Strategy::Topic => "topic",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Strategy::Exact),
            "fuzzy" => Ok(Strategy::Fuzzy),
            "semantic" => Ok(Strategy::Semantic),
            "topic" => Ok(Strategy::Topic),
            other => Err(SearchError::InvalidArgument(format!(
                "unknown strategy '{}'; use exact, fuzzy, semantic, topic, or all",
                other
            ))),
        }
    }
}

/// Which strategies a search should run.
#[derive(Debug, Clone)]
pub enum StrategySelection {
    /// Every registered engine.
    All,
    /// Only the listed strategies.
    Only(Vec<Strategy>),
}

impl FromStr for StrategySelection {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(StrategySelection::All)
        } else {
            Ok(StrategySelection::Only(vec![s.parse()?]))
        }
    }
}

/// A candidate produced by a single engine. `raw_score` is engine-native:
/// negated BM25 rank for exact, a [0,1] similarity ratio for fuzzy, cosine
/// similarity for semantic and topic. Higher is always better.
#[derive(Debug, Clone)]
pub struct EngineHit {
    pub verse_id: String,
    pub raw_score: f64,
}

/// The orchestrator's output unit: a verse with its fused normalized score
/// and the engines that contributed to it.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub verse: VerseMeta,
    /// Fused score in `[0.0, 1.0]` (max across contributing engines).
    pub score: f64,
    /// Engines that matched this verse, in strategy order.
    pub engines: Vec<Strategy>,
    /// Per-engine normalized scores, populated when scores were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_scores: Option<BTreeMap<Strategy, f64>>,
}

/// One `(book, chapter)` group of categorized results.
///
/// Groups are ordered by their best-scoring member's rank; results within a
/// group keep their post-sort relative order, so flattening the groups in
/// order reproduces the flat ranking exactly.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterGroup {
    pub book: String,
    pub chapter: i64,
    pub results: Vec<RankedResult>,
}

/// One stored `(verse_id, vector)` pair of the embedding index.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub verse_id: String,
    pub vector: Vec<f32>,
}
