//! Error taxonomy for corpus search.
//!
//! Per-engine runtime faults are represented by [`SearchError::EngineFailure`]
//! but are normally recovered inside the orchestrator (the engine is excluded
//! and the search proceeds). Every other variant is terminal for the call
//! that produced it.

use thiserror::Error;

use crate::models::Strategy;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The query was empty or whitespace-only.
    #[error("query must not be empty")]
    InvalidQuery,

    /// A caller-supplied argument (limit, strategy selector) was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The lexical index was queried before the corpus was ingested.
    #[error("lexical index not built; ingest a corpus first")]
    IndexNotBuilt,

    /// Every requested strategy was unavailable or failed.
    #[error("no search engine available for the requested strategies")]
    NoEngineAvailable,

    /// A corpus document violated the ingestion schema.
    #[error("malformed corpus: {0}")]
    MalformedCorpus(String),

    /// A single engine faulted at call time.
    #[error("{strategy} engine failed")]
    EngineFailure {
        strategy: Strategy,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
