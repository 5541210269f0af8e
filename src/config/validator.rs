use crate::config::Config;
use crate::error::{RagfuseError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_hybrid(config, &mut errors);
        Self::validate_channels(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_rewrite(config, &mut errors);
        Self::validate_security(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagfuseError::ConfigValidation { errors })
        }
    }

    fn validate_hybrid(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.hybrid.top_k == 0 {
            errors.push(ValidationError::new(
                "hybrid.top_k",
                "Top-K must be greater than 0",
            ));
        }

        if config.hybrid.rrf_k <= 0.0 {
            errors.push(ValidationError::new(
                "hybrid.rrf_k",
                format!("RRF constant must be positive, got {}", config.hybrid.rrf_k),
            ));
        }
    }

    fn validate_channels(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.keyword.top_n == 0 {
            errors.push(ValidationError::new(
                "keyword.top_n",
                "Keyword candidate size must be greater than 0",
            ));
        }

        if config.vector.top_k == 0 {
            errors.push(ValidationError::new(
                "vector.top_k",
                "Vector candidate size must be greater than 0",
            ));
        }

        let threshold = config.vector.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "vector.similarity_threshold",
                format!("Threshold must be between 0.0 and 1.0, got {}", threshold),
            ));
        }

        if config.vector.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "vector.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        if config.retrieval.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.timeout_ms",
                "Channel timeout must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if config.embedding.dimension != config.index.vector_dim {
            errors.push(ValidationError::new(
                "index.vector_dim",
                format!(
                    "Index dimension {} does not match embedding dimension {}",
                    config.index.vector_dim, config.embedding.dimension
                ),
            ));
        }

        if config.index.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.index.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.rerank.enabled {
            if config.rerank.timeout_ms == 0 {
                errors.push(ValidationError::new(
                    "rerank.timeout_ms",
                    "Rerank timeout must be greater than 0",
                ));
            }

            if config.rerank.model.is_empty() {
                errors.push(ValidationError::new(
                    "rerank.model",
                    "Rerank model cannot be empty",
                ));
            }

            // An enabled reranker with no endpoint is a silent no-op;
            // surface the likely misconfiguration.
            if config.rerank.endpoint.is_empty() {
                tracing::warn!(
                    "rerank.enabled is set but rerank.endpoint is empty; the stage will be skipped"
                );
            }
        }
    }

    fn validate_rewrite(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.query_rewrite.enabled && config.query_rewrite.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "query_rewrite.timeout_ms",
                "Rewrite timeout must be greater than 0",
            ));
        }
    }

    fn validate_security(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.security.enabled {
            let threshold = config.security.risk_threshold;
            if !(0.0..=1.0).contains(&threshold) {
                errors.push(ValidationError::new(
                    "security.risk_threshold",
                    format!("Threshold must be between 0.0 and 1.0, got {}", threshold),
                ));
            }

            if config.security.max_input_length == 0 {
                errors.push(ValidationError::new(
                    "security.max_input_length",
                    "Max input length must be greater than 0",
                ));
            }
        }
    }
}
