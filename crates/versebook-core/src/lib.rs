//! # Versebook Core
//!
//! Shared logic for Versebook: data models, the multi-strategy search
//! orchestrator, the fuzzy matcher, the embedding-index lifecycle, and the
//! corpus store abstraction.
//!
//! This crate contains no database or CLI dependencies. The application
//! crate provides the SQLite store and embedding providers; tests and
//! embedded uses can substitute [`store::memory::MemoryCorpusStore`] and a
//! stub [`embedding::Embedder`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Core data types: `Verse`, `Strategy`, `EngineHit`, `RankedResult` |
//! | [`error`] | The `SearchError` taxonomy |
//! | [`store`] | `CorpusStore` trait plus the in-memory implementation |
//! | [`engine`] | `Engine` trait, the four engines, and the strategy registry |
//! | [`search`] | Score normalization, max-fusion, dedup, sort, categorization |
//! | [`fuzzy`] | Typo-tolerant token matching (Levenshtein) |
//! | [`embedding`] | `Embedder` trait and vector utilities |
//! | [`index`] | Embedding index state machine: build, persist, invalidate |
//! | [`topic`] | Curated topic-keyword expansion for theme search |

pub mod embedding;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod index;
pub mod models;
pub mod search;
pub mod store;
pub mod topic;

pub use error::SearchError;
pub use models::{EngineHit, RankedResult, Strategy, VerseMeta};
