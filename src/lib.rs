//! Ragfuse - Hybrid Retrieval & Rank Fusion
//!
//! Turns a free-text user query (optionally carrying prior conversation
//! turns) into a ranked, bounded set of supporting documents for a
//! downstream language model: keyword and vector channels retrieved
//! concurrently, merged with Reciprocal Rank Fusion, deduplicated, and
//! optionally reordered by an external rerank service.

pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod retrieval;
pub mod security;

pub use error::{RagfuseError, Result};
