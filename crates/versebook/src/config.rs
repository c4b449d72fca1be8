//! TOML configuration loading and validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Extra topic definitions merged over the built-in topic map:
    /// `[topics]` maps a topic name to its representative phrases.
    #[serde(default)]
    pub topics: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            topics: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/versebook.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_fuzzy_cutoff")]
    pub fuzzy_cutoff: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            candidate_k: default_candidate_k(),
            fuzzy_cutoff: default_fuzzy_cutoff(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_candidate_k() -> usize {
    50
}
fn default_fuzzy_cutoff() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Load and validate configuration. A missing file is not an error: every
/// section has usable defaults, so a bare checkout works without a config.
pub fn load_config(path: &Path) -> Result<Config> {
    let config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "config file not found; using defaults");
        Config::default()
    };

    // Validate retrieval
    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    if config.retrieval.candidate_k < config.retrieval.default_limit {
        anyhow::bail!("retrieval.candidate_k must be >= retrieval.default_limit");
    }
    if !(0.0..=1.0).contains(&config.retrieval.fuzzy_cutoff) {
        anyhow::bail!("retrieval.fuzzy_cutoff must be in [0.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    for (name, phrases) in &config.topics {
        if name.trim().is_empty() || phrases.is_empty() {
            anyhow::bail!("topics entries need a non-empty name and at least one phrase");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = load_config(Path::new("/nonexistent/versebook.toml")).unwrap();
        assert_eq!(cfg.retrieval.default_limit, 10);
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn test_parse_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            [db]
            path = "/tmp/test.db"

            [retrieval]
            default_limit = 5
            candidate_k = 25
            fuzzy_cutoff = 0.6

            [embedding]
            provider = "openai"
            model = "text-embedding-3-small"
            dims = 1536

            [topics]
            courage = ["be strong and of good courage"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.retrieval.default_limit, 5);
        assert!(cfg.embedding.is_enabled());
        assert_eq!(cfg.topics["courage"].len(), 1);
    }

    #[test]
    fn test_bad_cutoff_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versebook.toml");
        std::fs::write(&path, "[retrieval]\nfuzzy_cutoff = 1.5\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
