//! Retrieval channels over the index collaborators
//!
//! Both channels expose the same contract and hold no request-scoped
//! state, so a single instance serves concurrent pipeline runs.

use crate::index::{EmbeddingProvider, KeywordIndex, VectorIndex};
use crate::retrieval::Document;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Keyword search failed: {0}")]
    Keyword(String),

    #[error("Vector search failed: {0}")]
    Vector(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),
}

/// One retrieval channel: ranked documents for a query, best first.
/// An empty list is a valid result; errors are isolated by the caller.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RetrievalError>;
}

/// Full-text channel over the keyword index, scoped to the document
/// body and bounded by a configurable candidate size.
pub struct KeywordRetriever {
    index: Arc<RwLock<KeywordIndex>>,
    top_n: usize,
}

impl KeywordRetriever {
    pub fn new(index: Arc<RwLock<KeywordIndex>>, top_n: usize) -> Self {
        Self { index, top_n }
    }
}

#[async_trait]
impl DocumentRetriever for KeywordRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RetrievalError> {
        let index = self.index.read().await;
        index
            .search(query, self.top_n)
            .map_err(|e| RetrievalError::Keyword(e.to_string()))
    }
}

/// Nearest-neighbour channel: embeds the query and searches the vector
/// index, dropping hits below the similarity threshold.
pub struct VectorRetriever {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<RwLock<VectorIndex>>,
    top_k: usize,
    similarity_threshold: f32,
    ef_search: usize,
}

impl VectorRetriever {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<RwLock<VectorIndex>>,
        top_k: usize,
        similarity_threshold: f32,
        ef_search: usize,
    ) -> Self {
        Self {
            provider,
            index,
            top_k,
            similarity_threshold,
            ef_search,
        }
    }
}

#[async_trait]
impl DocumentRetriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RetrievalError> {
        let embedding = self
            .provider
            .embed(query)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let index = self.index.read().await;
        let hits = index
            .search(&embedding, self.top_k, self.ef_search)
            .map_err(|e| RetrievalError::Vector(e.to_string()))?;

        Ok(hits
            .into_iter()
            .filter(|(_, score)| *score >= self.similarity_threshold)
            .map(|(document, _)| document)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::EmbeddingError;

    /// Deterministic 4-dim embedder: one axis per known token.
    struct TokenEmbedder;

    impl EmbeddingProvider for TokenEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let tokens = ["loan", "rate", "repay", "limit"];
            let lower = text.to_lowercase();
            let mut v: Vec<f32> = tokens
                .iter()
                .map(|t| if lower.contains(t) { 1.0 } else { 0.0 })
                .collect();
            if v.iter().all(|x| *x == 0.0) {
                v[3] = 0.1;
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "token-test"
        }
    }

    #[tokio::test]
    async fn test_keyword_retriever_bounded_and_ordered() {
        let mut index = KeywordIndex::new().unwrap();
        index
            .insert(&Document::with_id("a", "early repayment has no penalty fee"))
            .unwrap();
        index
            .insert(&Document::with_id("b", "repayment schedule is monthly"))
            .unwrap();
        index
            .insert(&Document::with_id("c", "greeting and opening message"))
            .unwrap();
        index.commit().unwrap();

        let retriever = KeywordRetriever::new(Arc::new(RwLock::new(index)), 2);
        let results = retriever.retrieve("repayment").await.unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        assert!(results.iter().all(|d| d.text.contains("repayment")));
    }

    #[tokio::test]
    async fn test_vector_retriever_applies_threshold() {
        let provider = Arc::new(TokenEmbedder);
        let mut index = VectorIndex::new(4, 32, 8);

        let loan = Document::with_id("loan", "loan");
        let rate = Document::with_id("rate", "rate");
        index
            .insert(loan.clone(), &provider.embed("loan").unwrap())
            .unwrap();
        index
            .insert(rate.clone(), &provider.embed("rate").unwrap())
            .unwrap();

        let retriever = VectorRetriever::new(
            provider,
            Arc::new(RwLock::new(index)),
            10,
            0.9,
            50,
        );

        let results = retriever.retrieve("loan").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.as_deref(), Some("loan"));
    }

    #[tokio::test]
    async fn test_vector_retriever_empty_index() {
        let provider = Arc::new(TokenEmbedder);
        let index = VectorIndex::new(4, 32, 8);
        let retriever =
            VectorRetriever::new(provider, Arc::new(RwLock::new(index)), 10, 0.0, 50);
        let results = retriever.retrieve("loan").await.unwrap();
        assert!(results.is_empty());
    }
}
