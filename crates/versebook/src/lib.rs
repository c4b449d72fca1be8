//! # Versebook application crate
//!
//! The SQLite-backed store, corpus ingestion, embedding providers, and the
//! command implementations behind the `vrs` binary. Search semantics
//! (engines, normalization, fusion, ranking) live in `versebook-core`.

pub mod config;
pub mod db;
pub mod embedding;
pub mod index_cmd;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
