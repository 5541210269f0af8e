//! Index collaborators behind the retrieval channels
//!
//! The pipeline only depends on the contracts here: an embedding
//! provider, a full-text keyword index, and a nearest-neighbour vector
//! index. The bundled implementations (FastEmbed, Tantivy, HNSW) keep
//! the crate runnable without external services.

mod keyword;
mod provider;
mod vector;

pub use keyword::{KeywordIndex, KeywordIndexError};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector::{VectorIndex, VectorIndexError};
