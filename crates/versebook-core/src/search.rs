//! Search orchestration: fan a query out to the selected engines, normalize
//! their raw scores into `[0.0, 1.0]`, fuse duplicates by taking the best
//! score per verse, and produce a deterministic ranking.
//!
//! Determinism contract: equal fused scores are broken by canonical corpus
//! position (book order, chapter, verse), so the same corpus and query
//! always produce the same ordering regardless of engine timing.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::EngineSet;
use crate::error::{Result, SearchError};
use crate::models::{ChapterGroup, EngineHit, RankedResult, Strategy, StrategySelection};
use crate::store::CorpusStore;

/// Default number of results returned to the caller.
pub const DEFAULT_LIMIT: usize = 10;

/// Default per-engine candidate pool. Wider than the final limit so fusion
/// has real choices; candidates beyond this are cut before normalization.
pub const DEFAULT_CANDIDATE_K: usize = 50;

/// Parameters of one search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub strategies: StrategySelection,
    /// Maximum results returned. Must be at least 1.
    pub limit: usize,
    /// Per-engine candidate pool size. Must be at least `limit`.
    pub candidate_k: usize,
    /// Attach per-engine normalized scores to each result.
    pub include_scores: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            strategies: StrategySelection::All,
            limit: DEFAULT_LIMIT,
            candidate_k: DEFAULT_CANDIDATE_K,
            include_scores: false,
        }
    }
}

/// The search orchestrator: owns the engine registry and the store used to
/// enrich fused hits back into full verses.
pub struct Searcher {
    store: Arc<dyn CorpusStore>,
    engines: EngineSet,
}

impl Searcher {
    pub fn new(store: Arc<dyn CorpusStore>, engines: EngineSet) -> Self {
        Self { store, engines }
    }

    /// Run a search and return the fused, ranked, truncated results.
    pub async fn search(&self, req: &SearchRequest) -> Result<Vec<RankedResult>> {
        let query = req.query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery);
        }
        if req.limit == 0 {
            return Err(SearchError::InvalidArgument(
                "limit must be at least 1".to_string(),
            ));
        }
        let candidate_k = req.candidate_k.max(req.limit);

        let strategies = self.resolve_strategies(&req.strategies)?;

        // Invoke engines in fixed strategy order. A failing engine is
        // excluded from fusion; a corpus that was never ingested is
        // terminal for every engine, so IndexNotBuilt propagates as-is.
        let mut per_strategy: Vec<(Strategy, Vec<EngineHit>)> = Vec::new();
        let mut failures = 0usize;
        for strategy in &strategies {
            let engine = self
                .engines
                .get(*strategy)
                .ok_or(SearchError::NoEngineAvailable)?;
            match engine.search(query, candidate_k).await {
                Ok(hits) => per_strategy.push((*strategy, hits)),
                Err(SearchError::IndexNotBuilt) => return Err(SearchError::IndexNotBuilt),
                Err(e) => {
                    tracing::warn!(strategy = %strategy, error = %e, "engine failed; excluding from results");
                    failures += 1;
                }
            }
        }
        if per_strategy.is_empty() {
            debug_assert!(failures > 0 || strategies.is_empty());
            return Err(SearchError::NoEngineAvailable);
        }

        // Normalize within each engine's result list, then fuse across
        // engines keeping the best normalized score per verse.
        let mut fused: BTreeMap<String, FusedHit> = BTreeMap::new();
        for (strategy, hits) in per_strategy {
            for (verse_id, score) in normalize(strategy, &hits) {
                let entry = fused.entry(verse_id).or_default();
                if score > entry.score {
                    entry.score = score;
                }
                entry.engines.push(strategy);
                entry.engine_scores.insert(strategy, score);
            }
        }

        let mut results = Vec::with_capacity(fused.len());
        for (verse_id, hit) in fused {
            let Some(verse) = self.store.verse_meta(&verse_id).await? else {
                // An engine surfaced an id the corpus no longer has (e.g.
                // stale vectors mid-reingest). Drop it rather than fail.
                tracing::warn!(verse_id, "hit references unknown verse; skipping");
                continue;
            };
            results.push(RankedResult {
                verse,
                score: hit.score,
                engines: hit.engines,
                engine_scores: req.include_scores.then_some(hit.engine_scores),
            });
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.verse.canonical_key().cmp(&b.verse.canonical_key()))
                .then_with(|| a.verse.id.cmp(&b.verse.id))
        });
        results.truncate(req.limit);
        Ok(results)
    }

    /// Run a search and group the ranking into `(book, chapter)` sections.
    pub async fn search_categorized(&self, req: &SearchRequest) -> Result<Vec<ChapterGroup>> {
        let results = self.search(req).await?;
        Ok(categorize(results))
    }

    fn resolve_strategies(&self, selection: &StrategySelection) -> Result<Vec<Strategy>> {
        let resolved: Vec<Strategy> = match selection {
            StrategySelection::All => self.engines.strategies(),
            StrategySelection::Only(wanted) => {
                // Preserve fixed strategy order and drop duplicates.
                Strategy::ALL
                    .into_iter()
                    .filter(|s| wanted.contains(s))
                    .filter(|s| {
                        let registered = self.engines.get(*s).is_some();
                        if !registered {
                            tracing::warn!(strategy = %s, "requested strategy has no engine; skipping");
                        }
                        registered
                    })
                    .collect()
            }
        };
        if resolved.is_empty() {
            return Err(SearchError::NoEngineAvailable);
        }
        Ok(resolved)
    }
}

#[derive(Default)]
struct FusedHit {
    score: f64,
    engines: Vec<Strategy>,
    engine_scores: BTreeMap<Strategy, f64>,
}

/// Map one engine's raw scores into `[0.0, 1.0]`.
///
/// Exact raw scores are unbounded (negated BM25 rank), so they are scaled
/// against the best score in the list; a degenerate list where the best is
/// non-positive scores everything 1.0, matching the all-equal rule. Fuzzy,
/// semantic and topic scores are already ratios and only need clamping
/// (cosine similarity can be negative).
fn normalize(strategy: Strategy, hits: &[EngineHit]) -> Vec<(String, f64)> {
    match strategy {
        Strategy::Exact => {
            let best = hits
                .iter()
                .map(|h| h.raw_score)
                .fold(f64::NEG_INFINITY, f64::max);
            hits.iter()
                .map(|h| {
                    let score = if best <= 0.0 {
                        1.0
                    } else {
                        (h.raw_score / best).clamp(0.0, 1.0)
                    };
                    (h.verse_id.clone(), score)
                })
                .collect()
        }
        Strategy::Fuzzy | Strategy::Semantic | Strategy::Topic => hits
            .iter()
            .map(|h| (h.verse_id.clone(), h.raw_score.clamp(0.0, 1.0)))
            .collect(),
    }
}

/// Group a ranking into maximal runs sharing the same `(book, chapter)`.
///
/// Because runs are taken from the already-sorted ranking, concatenating
/// the groups' results reproduces the flat ranking exactly.
pub fn categorize(results: Vec<RankedResult>) -> Vec<ChapterGroup> {
    let mut groups: Vec<ChapterGroup> = Vec::new();
    for result in results {
        match groups.last_mut() {
            Some(g) if g.book == result.verse.book && g.chapter == result.verse.chapter => {
                g.results.push(result);
            }
            _ => groups.push(ChapterGroup {
                book: result.verse.book.clone(),
                chapter: result.verse.chapter,
                results: vec![result],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::engine::{Engine, ExactEngine, FuzzyEngine};
    use crate::models::{verse_id, VerseMeta};
    use crate::store::memory::MemoryCorpusStore;

    fn verse(book: &str, order: i64, chapter: i64, num: i64, text: &str) -> VerseMeta {
        VerseMeta {
            id: verse_id("T", book, chapter, num),
            translation: "T".to_string(),
            book: book.to_string(),
            book_order: order,
            chapter,
            verse: num,
            text: text.to_string(),
        }
    }

    fn corpus() -> Vec<VerseMeta> {
        vec![
            verse("Genesis", 0, 1, 1, "In the beginning God created the heaven and the earth"),
            verse("Genesis", 0, 1, 3, "And God said let there be light and there was light"),
            verse("Genesis", 0, 2, 7, "And the Lord God formed man of the dust of the ground"),
            verse("Matthew", 1, 5, 9, "Blessed are the peacemakers for they shall be called the children of God"),
            verse("Matthew", 1, 22, 39, "Thou shalt love thy neighbour as thyself"),
        ]
    }

    fn searcher_with(store: Arc<MemoryCorpusStore>) -> Searcher {
        let store: Arc<dyn CorpusStore> = store;
        let mut engines = EngineSet::new();
        engines.register(Arc::new(ExactEngine::new(Arc::clone(&store))));
        engines.register(Arc::new(FuzzyEngine::new(Arc::clone(&store), 0.3)));
        Searcher::new(store, engines)
    }

    fn default_searcher() -> Searcher {
        searcher_with(Arc::new(MemoryCorpusStore::new(corpus())))
    }

    struct FailingEngine(Strategy);

    #[async_trait]
    impl Engine for FailingEngine {
        fn strategy(&self) -> Strategy {
            self.0
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<EngineHit>> {
            Err(SearchError::EngineFailure {
                strategy: self.0,
                source: anyhow::anyhow!("backend unreachable"),
            })
        }
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let searcher = default_searcher();
        assert!(matches!(
            searcher.search(&SearchRequest::new("   ")).await,
            Err(SearchError::InvalidQuery)
        ));
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let searcher = default_searcher();
        let mut req = SearchRequest::new("light");
        req.limit = 0;
        assert!(matches!(
            searcher.search(&req).await,
            Err(SearchError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_scores_normalized_and_sorted() {
        let searcher = default_searcher();
        let results = searcher.search(&SearchRequest::new("God")).await.unwrap();
        assert!(!results.is_empty());
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for r in &results {
            assert!(r.score >= 0.0 && r.score <= 1.0, "score {}", r.score);
        }
        // The top exact hit is scaled to the maximum.
        assert!((results[0].score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_dedup_keeps_best_score_and_lists_engines() {
        let searcher = default_searcher();
        let mut req = SearchRequest::new("love thy neighbour");
        req.include_scores = true;
        let results = searcher.search(&req).await.unwrap();

        let hit = results
            .iter()
            .find(|r| r.verse.id == "T:Matthew:22:39")
            .expect("expected Matthew 22:39 in results");
        // Both engines match it; it must appear exactly once.
        assert_eq!(
            results.iter().filter(|r| r.verse.id == hit.verse.id).count(),
            1
        );
        assert_eq!(hit.engines, vec![Strategy::Exact, Strategy::Fuzzy]);
        let scores = hit.engine_scores.as_ref().unwrap();
        let best = scores.values().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        assert!((hit.score - best).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_engine_scores_omitted_by_default() {
        let searcher = default_searcher();
        let results = searcher.search(&SearchRequest::new("God")).await.unwrap();
        assert!(results.iter().all(|r| r.engine_scores.is_none()));
    }

    #[tokio::test]
    async fn test_equal_scores_break_by_canonical_order() {
        // Both verses contain "dust" exactly once so their exact scores tie.
        let store = Arc::new(MemoryCorpusStore::new(vec![
            verse("Matthew", 1, 10, 14, "shake off the dust of your feet"),
            verse("Genesis", 0, 3, 19, "for dust thou art and unto dust"),
        ]));
        let searcher = searcher_with(store);

        let mut req = SearchRequest::new("feet art");
        req.strategies = StrategySelection::Only(vec![Strategy::Exact]);
        let results = searcher.search(&req).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!((results[0].score - results[1].score).abs() < 1e-9);
        assert_eq!(results[0].verse.book, "Genesis");
        assert_eq!(results[1].verse.book, "Matthew");
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let searcher = default_searcher();
        let mut req = SearchRequest::new("God");
        req.limit = 1;
        let results = searcher.search(&req).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_engine_excluded_not_fatal() {
        let store: Arc<dyn CorpusStore> = Arc::new(MemoryCorpusStore::new(corpus()));
        let mut engines = EngineSet::new();
        engines.register(Arc::new(ExactEngine::new(Arc::clone(&store))));
        engines.register(Arc::new(FailingEngine(Strategy::Semantic)));
        let searcher = Searcher::new(store, engines);

        let results = searcher.search(&SearchRequest::new("light")).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.engines == vec![Strategy::Exact]));
    }

    #[tokio::test]
    async fn test_all_engines_failing_is_no_engine_available() {
        let store: Arc<dyn CorpusStore> = Arc::new(MemoryCorpusStore::new(corpus()));
        let mut engines = EngineSet::new();
        engines.register(Arc::new(FailingEngine(Strategy::Semantic)));
        engines.register(Arc::new(FailingEngine(Strategy::Topic)));
        let searcher = Searcher::new(store, engines);

        assert!(matches!(
            searcher.search(&SearchRequest::new("light")).await,
            Err(SearchError::NoEngineAvailable)
        ));
    }

    #[tokio::test]
    async fn test_unregistered_strategy_selection_fails() {
        let searcher = default_searcher();
        let mut req = SearchRequest::new("light");
        req.strategies = StrategySelection::Only(vec![Strategy::Semantic]);
        assert!(matches!(
            searcher.search(&req).await,
            Err(SearchError::NoEngineAvailable)
        ));
    }

    #[tokio::test]
    async fn test_empty_corpus_surfaces_index_not_built() {
        let searcher = searcher_with(Arc::new(MemoryCorpusStore::new(Vec::new())));
        assert!(matches!(
            searcher.search(&SearchRequest::new("light")).await,
            Err(SearchError::IndexNotBuilt)
        ));
    }

    #[tokio::test]
    async fn test_categorize_flattens_back_to_flat_ranking() {
        let searcher = default_searcher();
        let req = SearchRequest::new("God");
        let flat = searcher.search(&req).await.unwrap();
        let groups = searcher.search_categorized(&req).await.unwrap();

        let flattened: Vec<&str> = groups
            .iter()
            .flat_map(|g| g.results.iter().map(|r| r.verse.id.as_str()))
            .collect();
        let expected: Vec<&str> = flat.iter().map(|r| r.verse.id.as_str()).collect();
        assert_eq!(flattened, expected);

        for g in &groups {
            assert!(g
                .results
                .iter()
                .all(|r| r.verse.book == g.book && r.verse.chapter == g.chapter));
        }
    }

    #[test]
    fn test_normalize_exact_scales_to_best() {
        let hits = vec![
            EngineHit {
                verse_id: "a".into(),
                raw_score: 4.0,
            },
            EngineHit {
                verse_id: "b".into(),
                raw_score: 1.0,
            },
        ];
        let norm = normalize(Strategy::Exact, &hits);
        assert!((norm[0].1 - 1.0).abs() < 1e-9);
        assert!((norm[1].1 - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_exact_degenerate_all_ones() {
        // Negated BM25 ranks can all be non-positive for a single hit list.
        let hits = vec![EngineHit {
            verse_id: "a".into(),
            raw_score: -0.5,
        }];
        let norm = normalize(Strategy::Exact, &hits);
        assert!((norm[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_clamps_negative_cosine() {
        let hits = vec![EngineHit {
            verse_id: "a".into(),
            raw_score: -0.3,
        }];
        let norm = normalize(Strategy::Semantic, &hits);
        assert_eq!(norm[0].1, 0.0);
    }
}
