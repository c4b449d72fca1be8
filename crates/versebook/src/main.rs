//! # Versebook CLI (`vrs`)
//!
//! The `vrs` binary is the interface to Versebook: corpus ingestion,
//! multi-strategy verse search, and embedding index management.
//!
//! ## Usage
//!
//! ```bash
//! vrs --config ./config/versebook.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vrs init` | Create the SQLite database and run schema migrations |
//! | `vrs ingest <path>` | Load a corpus JSON file (or directory of files) |
//! | `vrs search "<query>"` | Search verses across the selected strategies |
//! | `vrs index build` | Build the embedding index for semantic/topic search |
//! | `vrs index status` | Show embedding index freshness |
//! | `vrs stats` | Show corpus and index counts |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! vrs init
//!
//! # Ingest a translation
//! vrs ingest ./corpora/kjv.json
//!
//! # Search with every available strategy
//! vrs search "love thy neighbour"
//!
//! # Typo-tolerant search only
//! vrs search "forgivness" --strategy fuzzy
//!
//! # Theme search with per-engine scores
//! vrs search "forgiveness" --strategy topic --scores
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use versebook::{config, index_cmd, ingest, migrate, search, stats};

/// Versebook CLI — multi-strategy search over a scripture corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; a missing file falls back to built-in defaults.
#[derive(Parser)]
#[command(
    name = "vrs",
    about = "Versebook — exact, fuzzy, semantic, and topic search over a verse corpus",
    version,
    long_about = "Versebook ingests structured scripture corpora into SQLite and answers queries \
    through four retrieval strategies: exact full-text search (FTS5), typo-tolerant fuzzy matching, \
    embedding-based semantic search, and curated topic search. Results are score-normalized, fused, \
    and grouped by book and chapter."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/versebook.toml`. Database, retrieval, and
    /// embedding settings are read from this file.
    #[arg(long, global = true, default_value = "./config/versebook.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (verses,
    /// verses_fts, verse_vectors, embedding_index). This command is
    /// idempotent — running it multiple times is safe.
    Init,

    /// Ingest a corpus JSON file, or every `.json` file in a directory.
    ///
    /// Each file holds one translation: books, chapters, and numbered
    /// verses. Re-ingesting a translation replaces it atomically; a
    /// malformed file leaves the database unchanged.
    Ingest {
        /// Path to a corpus `.json` file or a directory of them.
        path: PathBuf,

        /// Override the translation name from the file (e.g. `KJV`).
        #[arg(long)]
        translation: Option<String>,
    },

    /// Search the corpus.
    ///
    /// Runs the query through the selected strategies, fuses and ranks the
    /// results, and prints them grouped by book and chapter.
    Search {
        /// The search query string.
        query: String,

        /// Strategies to run: `all` or a comma-separated list of
        /// `exact`, `fuzzy`, `semantic`, `topic`.
        /// Semantic and topic require an embedding provider to be configured.
        #[arg(long, default_value = "all")]
        strategy: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Show per-engine normalized scores for each result.
        #[arg(long)]
        scores: bool,

        /// Print a flat ranked list instead of book/chapter groups.
        #[arg(long)]
        flat: bool,

        /// Emit results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage the embedding index.
    ///
    /// Requires an embedding provider (e.g., OpenAI) to be configured.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Show corpus and embedding index statistics.
    Stats,
}

/// Embedding index subcommands.
#[derive(Subcommand)]
enum IndexAction {
    /// Embed every verse and persist the index.
    ///
    /// Skips the embedding pass entirely when a persisted index already
    /// matches the current corpus fingerprint.
    Build,

    /// Show whether each persisted index is ready, stale, or unbuilt.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("versebook=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, translation } => {
            let report = ingest::run_ingest(&cfg, &path, translation.as_deref()).await?;
            println!(
                "Ingested {} file(s): {} book(s), {} verse(s) across {}.",
                report.files,
                report.books,
                report.verses,
                report.translations.join(", ")
            );
        }
        Commands::Search {
            query,
            strategy,
            limit,
            scores,
            flat,
            json,
        } => {
            search::run_search(&cfg, &query, &strategy, limit, scores, flat, json).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build => {
                index_cmd::run_index_build(&cfg).await?;
            }
            IndexAction::Status => {
                index_cmd::run_index_status(&cfg).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
