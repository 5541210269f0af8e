//! Pipeline orchestration: rewrite, retrieve, fuse, rerank

use crate::config::{Config, RetrieverMode};
use crate::retrieval::{
    apply_rerank, reciprocal_rank_fusion, Document, DocumentRetriever, QueryRewriter, RerankClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

/// Sequences the pipeline stages and enforces per-stage degradation.
///
/// Stages run strictly in order except retrieval, where both channels
/// execute concurrently and the stage completes once both have returned
/// or been absorbed as an empty result. No stage is retried; the
/// terminal output is always a bounded ordered list, possibly empty.
pub struct HybridPipeline {
    rewriter: QueryRewriter,
    keyword: Arc<dyn DocumentRetriever>,
    vector: Arc<dyn DocumentRetriever>,
    reranker: RerankClient,
    mode: RetrieverMode,
    top_k: usize,
    rrf_k: f64,
    channel_timeout: Duration,
}

impl HybridPipeline {
    pub fn new(
        rewriter: QueryRewriter,
        keyword: Arc<dyn DocumentRetriever>,
        vector: Arc<dyn DocumentRetriever>,
        reranker: RerankClient,
        config: &Config,
    ) -> Self {
        Self {
            rewriter,
            keyword,
            vector,
            reranker,
            mode: config.retriever.mode,
            top_k: config.hybrid.top_k,
            rrf_k: config.hybrid.rrf_k,
            channel_timeout: Duration::from_millis(config.retrieval.timeout_ms),
        }
    }

    /// Run the full pipeline for one query. Never fails: every stage
    /// degrades to a smaller, still-valid result set.
    pub async fn run(&self, raw_query: &str) -> Vec<Document> {
        let run_id = Uuid::new_v4();
        self.run_stages(raw_query)
            .instrument(tracing::debug_span!("pipeline", %run_id))
            .await
    }

    async fn run_stages(&self, raw_query: &str) -> Vec<Document> {
        let query = self.rewriter.rewrite(raw_query).await;

        let (keyword_docs, vector_docs) = tokio::join!(
            self.channel(
                "keyword",
                self.keyword.as_ref(),
                &query,
                self.mode.keyword_enabled(),
            ),
            self.channel(
                "vector",
                self.vector.as_ref(),
                &query,
                self.mode.vector_enabled(),
            ),
        );

        // Keyword channel first: equal fused scores tie-break on the
        // fixed channel order, keeping output reproducible.
        let fused = reciprocal_rank_fusion(
            &[("keyword", keyword_docs), ("vector", vector_docs)],
            self.rrf_k,
            self.top_k,
        );
        let mut documents: Vec<Document> = fused.into_iter().map(|entry| entry.document).collect();

        if self.reranker.is_enabled() && !documents.is_empty() {
            let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
            let items = self.reranker.rerank(&query, &texts).await;
            if !items.is_empty() {
                documents = apply_rerank(documents, &items);
            }
        }

        documents.truncate(self.top_k);
        tracing::debug!(results = documents.len(), query = %query, "pipeline complete");
        documents
    }

    /// One channel call, bounded by the per-channel timeout. Errors and
    /// timeouts are absorbed as an empty result so a failed channel
    /// never takes the run down with it.
    async fn channel(
        &self,
        name: &str,
        retriever: &dyn DocumentRetriever,
        query: &str,
        enabled: bool,
    ) -> Vec<Document> {
        if !enabled {
            return Vec::new();
        }

        match tokio::time::timeout(self.channel_timeout, retriever.retrieve(query)).await {
            Ok(Ok(documents)) => {
                tracing::debug!(channel = name, results = documents.len(), "channel complete");
                documents
            }
            Ok(Err(e)) => {
                tracing::warn!(channel = name, "channel failed, degrading to empty: {e}");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    channel = name,
                    timeout_ms = self.channel_timeout.as_millis() as u64,
                    "channel timed out, degrading to empty"
                );
                Vec::new()
            }
        }
    }
}
