//! Engine assembly and the `vrs search` command.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use versebook_core::engine::{
    EngineSet, ExactEngine, FuzzyEngine, SemanticEngine, TopicEngine,
};
use versebook_core::index::EmbeddingIndex;
use versebook_core::models::{ChapterGroup, RankedResult, Strategy, StrategySelection};
use versebook_core::search::{SearchRequest, Searcher};
use versebook_core::store::CorpusStore;
use versebook_core::topic::TopicMap;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteCorpusStore;

/// Wire the configured engines to a store. Exact and fuzzy are always
/// available; semantic and topic require an embedding provider.
pub fn build_searcher(config: &Config, pool: SqlitePool) -> Result<Searcher> {
    let store: Arc<dyn CorpusStore> = Arc::new(SqliteCorpusStore::new(pool));

    let mut engines = EngineSet::new();
    engines.register(Arc::new(ExactEngine::new(Arc::clone(&store))));
    engines.register(Arc::new(FuzzyEngine::new(
        Arc::clone(&store),
        config.retrieval.fuzzy_cutoff,
    )));

    match create_provider(&config.embedding)? {
        Some(embedder) => {
            let index = Arc::new(EmbeddingIndex::new(config.embedding.batch_size));
            engines.register(Arc::new(SemanticEngine::new(
                Arc::clone(&store),
                Arc::clone(&index),
                Arc::clone(&embedder),
            )));
            engines.register(Arc::new(TopicEngine::new(
                Arc::clone(&store),
                index,
                embedder,
                topic_map(config),
            )));
        }
        None => {
            tracing::debug!("embeddings disabled; semantic and topic engines unavailable");
        }
    }

    Ok(Searcher::new(store, engines))
}

/// Built-in topics, with config entries layered on top.
pub fn topic_map(config: &Config) -> TopicMap {
    let mut map = TopicMap::with_defaults();
    for (name, phrases) in &config.topics {
        let refs: Vec<&str> = phrases.iter().map(String::as_str).collect();
        map.insert(name, &refs);
    }
    map
}

/// Parse the `--strategy` flag: `all` or a comma-separated strategy list.
pub fn parse_strategies(s: &str) -> Result<StrategySelection> {
    if s.trim().eq_ignore_ascii_case("all") {
        return Ok(StrategySelection::All);
    }
    let strategies = s
        .split(',')
        .map(|part| part.parse::<Strategy>())
        .collect::<versebook_core::error::Result<Vec<_>>>()?;
    Ok(StrategySelection::Only(strategies))
}

#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    config: &Config,
    query: &str,
    strategy: &str,
    limit: Option<usize>,
    scores: bool,
    flat: bool,
    json: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let searcher = build_searcher(config, pool)?;

    let req = SearchRequest {
        query: query.to_string(),
        strategies: parse_strategies(strategy)?,
        limit: limit.unwrap_or(config.retrieval.default_limit),
        candidate_k: config.retrieval.candidate_k,
        include_scores: scores,
    };

    if flat {
        let results = searcher.search(&req).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&results)?);
        } else {
            print_flat(&results, scores);
        }
    } else {
        let groups = searcher.search_categorized(&req).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&groups)?);
        } else {
            print_grouped(&groups, scores);
        }
    }

    Ok(())
}

fn print_flat(results: &[RankedResult], scores: bool) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        println!("{:2}. {}", i + 1, format_result(result, scores));
    }
}

fn print_grouped(groups: &[ChapterGroup], scores: bool) {
    if groups.is_empty() {
        println!("No results.");
        return;
    }
    for group in groups {
        println!("{} {}", group.book, group.chapter);
        for result in &group.results {
            println!("  {}", format_result(result, scores));
        }
        println!();
    }
}

fn format_result(result: &RankedResult, scores: bool) -> String {
    let engines = result
        .engines
        .iter()
        .map(Strategy::as_str)
        .collect::<Vec<_>>()
        .join("+");

    let mut line = format!(
        "{}  [{:.1}%]  {}  ({})",
        result.verse.reference(),
        result.score * 100.0,
        result.verse.text,
        engines
    );

    if scores {
        if let Some(per_engine) = &result.engine_scores {
            let detail = per_engine
                .iter()
                .map(|(s, v)| format!("{}={:.2}", s, v))
                .collect::<Vec<_>>()
                .join(" ");
            line.push_str(&format!("  [{}]", detail));
        }
    }

    line
}
