//! Configuration management for ragfuse
//!
//! Loading, validation, and environment overrides for the pipeline
//! configuration surface.

use crate::error::{RagfuseError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hybrid: HybridConfig,
    pub retriever: RetrieverConfig,
    pub keyword: KeywordConfig,
    pub vector: VectorConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub rerank: RerankConfig,
    pub query_rewrite: QueryRewriteConfig,
    pub security: SecurityConfig,
}

/// Final result size and fusion smoothing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    /// Final Top-K after fusion and reranking
    pub top_k: usize,
    /// RRF smoothing constant; larger values flatten the influence of
    /// rank differences
    pub rrf_k: f64,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            rrf_k: 60.0,
        }
    }
}

/// Which channels participate in retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieverMode {
    Hybrid,
    Keyword,
    Vector,
}

impl RetrieverMode {
    pub fn keyword_enabled(self) -> bool {
        matches!(self, RetrieverMode::Hybrid | RetrieverMode::Keyword)
    }

    pub fn vector_enabled(self) -> bool {
        matches!(self, RetrieverMode::Hybrid | RetrieverMode::Vector)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub mode: RetrieverMode,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            mode: RetrieverMode::Hybrid,
        }
    }
}

/// Keyword channel candidate size
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub top_n: usize,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self { top_n: 20 }
    }
}

/// Vector channel bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub top_k: usize,
    /// Hits below this cosine similarity are dropped
    pub similarity_threshold: f32,
    pub hnsw_ef_search: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            similarity_threshold: 0.0,
            hnsw_ef_search: 50,
        }
    }
}

/// Per-channel retrieval bound
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
        }
    }
}

/// HNSW index parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub vector_dim: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            vector_dim: 384,
            hnsw_ef_construction: 200,
            hnsw_m: 16,
        }
    }
}

/// External rerank service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    /// Service endpoint; the stage is skipped while this is empty
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer token, empty for none
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            model: "bge-reranker-v2-m3".to_string(),
            api_key_env: "RAGFUSE_RERANK_API_KEY".to_string(),
            timeout_ms: 3000,
        }
    }
}

/// Query rewriting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRewriteConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    /// Custom prompt template with {history} and {query} placeholders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
}

impl Default for QueryRewriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 3000,
            prompt_template: None,
        }
    }
}

/// Input-guard policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enabled: bool,
    pub risk_threshold: f64,
    pub max_input_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            risk_threshold: 0.7,
            max_input_length: 1000,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagfuseError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagfuseError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagfuseError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides in the format
    /// `RAGFUSE_SECTION__KEY=value`
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("RAGFUSE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "HYBRID__TOP_K" => {
                self.hybrid.top_k = parse_env(path, value)?;
            }
            "HYBRID__RRF_K" => {
                self.hybrid.rrf_k = parse_env(path, value)?;
            }
            "RETRIEVER__MODE" => {
                self.retriever.mode = match value.to_lowercase().as_str() {
                    "hybrid" => RetrieverMode::Hybrid,
                    "keyword" => RetrieverMode::Keyword,
                    "vector" => RetrieverMode::Vector,
                    other => {
                        return Err(RagfuseError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Unknown retriever mode '{}'", other),
                        })
                    }
                };
            }
            "RERANK__ENABLED" => {
                self.rerank.enabled = parse_env(path, value)?;
            }
            "RERANK__ENDPOINT" => {
                self.rerank.endpoint = value.to_string();
            }
            "RERANK__MODEL" => {
                self.rerank.model = value.to_string();
            }
            "QUERY_REWRITE__ENABLED" => {
                self.query_rewrite.enabled = parse_env(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagfuseError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("ragfuse").join("config.toml"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| RagfuseError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trip() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.hybrid.top_k, 5);
        assert!((parsed.hybrid.rrf_k - 60.0).abs() < f64::EPSILON);
        assert_eq!(parsed.retriever.mode, RetrieverMode::Hybrid);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[hybrid]\ntop_k = 3\nrrf_k = 30.0\n").unwrap();
        assert_eq!(parsed.hybrid.top_k, 3);
        assert_eq!(parsed.keyword.top_n, 20);
        assert!(!parsed.rerank.enabled);
    }

    #[test]
    fn test_mode_parses_lowercase() {
        let parsed: Config = toml::from_str("[retriever]\nmode = \"keyword\"\n").unwrap();
        assert_eq!(parsed.retriever.mode, RetrieverMode::Keyword);
        assert!(parsed.retriever.mode.keyword_enabled());
        assert!(!parsed.retriever.mode.vector_enabled());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.hybrid.top_k, config.hybrid.top_k);
        assert_eq!(loaded.rerank.model, config.rerank.model);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(&path),
            Err(crate::error::RagfuseError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[hybrid]\ntop_k = 0\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_env_override_parsing() {
        let mut config = Config::default();
        config.set_value_from_env("RERANK__ENDPOINT", "http://localhost:9000/rerank").unwrap();
        config.set_value_from_env("RERANK__ENABLED", "true").unwrap();
        config.set_value_from_env("HYBRID__TOP_K", "8").unwrap();
        assert!(config.rerank.enabled);
        assert_eq!(config.rerank.endpoint, "http://localhost:9000/rerank");
        assert_eq!(config.hybrid.top_k, 8);

        assert!(config.set_value_from_env("HYBRID__TOP_K", "not-a-number").is_err());
        assert!(config.set_value_from_env("RETRIEVER__MODE", "both").is_err());
    }
}
