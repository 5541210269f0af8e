//! Hybrid retrieval and rank fusion.
//!
//! The pipeline runs keyword and vector retrieval concurrently, merges
//! both ranked lists with Reciprocal Rank Fusion, deduplicates by a
//! stable identity key, and optionally reorders the candidates through
//! an external rerank service before truncating to the final top-k.

mod channels;
mod fusion;
mod hybrid;
mod rerank;
mod rewrite;

pub use channels::{DocumentRetriever, KeywordRetriever, RetrievalError, VectorRetriever};
pub use fusion::{fusion_key, reciprocal_rank_fusion, FusionEntry};
pub use hybrid::HybridPipeline;
pub use rerank::{apply_rerank, RerankClient, RerankError, RerankItem};
pub use rewrite::{
    format_query_with_history, split_history, QueryRewriter, RewriteError, RewriteModel,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A retrievable unit of supporting text.
///
/// Identity for deduplication is derived (see [`fusion_key`]), not
/// necessarily equal to `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Explicit document id, when the source index provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Document body
    pub text: String,

    /// Source metadata (uri, source, canonical_id, ...)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    /// Builder-style metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "USER"),
            Role::Assistant => write!(f, "ASSISTANT"),
            Role::System => write!(f, "SYSTEM"),
        }
    }
}

/// A single prior turn of the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}
