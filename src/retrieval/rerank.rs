//! External rerank service client and candidate reordering

use crate::config::RerankConfig;
use crate::retrieval::Document;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Rerank request failed: {0}")]
    Request(String),

    #[error("Rerank service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rerank response malformed: {0}")]
    Malformed(String),
}

/// One scored item from the rerank service, referencing a position in
/// the candidate list that was sent.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RerankItem {
    pub index: i64,
    pub relevance_score: f64,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
    model: &'a str,
    return_documents: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Option<Vec<RerankItem>>,
}

/// HTTP client for an external rerank service.
///
/// Active only when enabled with a non-empty endpoint. Every failure
/// mode (timeout, transport error, non-2xx status, malformed or empty
/// body) degrades to an empty item list so the caller keeps the fused
/// order.
pub struct RerankClient {
    http: reqwest::Client,
    enabled: bool,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RerankClient {
    pub fn new(config: &RerankConfig) -> Self {
        let api_key = if config.api_key_env.is_empty() {
            None
        } else {
            std::env::var(&config.api_key_env)
                .ok()
                .filter(|key| !key.is_empty())
        };

        Self {
            http: reqwest::Client::new(),
            enabled: config.enabled,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.endpoint.is_empty()
    }

    /// Score `documents` against `query`, best first.
    pub async fn rerank(&self, query: &str, documents: &[String]) -> Vec<RerankItem> {
        if !self.is_enabled() || documents.is_empty() {
            return Vec::new();
        }

        match self.call(query, documents).await {
            Ok(mut items) => {
                items.sort_by(|a, b| {
                    b.relevance_score
                        .partial_cmp(&a.relevance_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                items
            }
            Err(e) => {
                tracing::warn!("rerank degraded to no-op: {e}");
                Vec::new()
            }
        }
    }

    async fn call(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RerankItem>, RerankError> {
        let payload = RerankRequest {
            query,
            documents,
            model: &self.model,
            return_documents: false,
        };

        let mut request = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&payload);

        if let Some(key) = &self.api_key {
            let bearer = if key.starts_with("Bearer ") {
                key.clone()
            } else {
                format!("Bearer {key}")
            };
            request = request.header(reqwest::header::AUTHORIZATION, bearer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RerankError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RerankError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RerankError::Malformed(e.to_string()))?;

        match parsed.results {
            Some(results) => Ok(results),
            None => {
                tracing::warn!("rerank response has no results");
                Ok(Vec::new())
            }
        }
    }
}

/// Reorder `documents` according to scored `items` (assumed sorted by
/// descending relevance).
///
/// Items with an out-of-range or already-consumed index are skipped
/// with a warning; candidates the reranker did not reference keep their
/// original relative order at the tail, so no document is dropped even
/// for a partial response.
pub fn apply_rerank(documents: Vec<Document>, items: &[RerankItem]) -> Vec<Document> {
    if items.is_empty() {
        return documents;
    }

    let len = documents.len();
    let mut slots: Vec<Option<Document>> = documents.into_iter().map(Some).collect();
    let mut reordered = Vec::with_capacity(len);

    for item in items {
        if item.index < 0 || item.index as usize >= len {
            tracing::warn!(index = item.index, "rerank item index out of range, skipped");
            continue;
        }
        match slots[item.index as usize].take() {
            Some(document) => reordered.push(document),
            None => {
                tracing::warn!(index = item.index, "rerank item index repeated, skipped");
            }
        }
    }

    for slot in &mut slots {
        if let Some(document) = slot.take() {
            reordered.push(document);
        }
    }

    reordered
}
