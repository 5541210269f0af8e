//! History-aware query rewriting with short-circuit rules
//!
//! Incoming text may embed prior conversation turns between sentinel
//! markers. The rewriter separates history from the current query,
//! answers trivially classifiable inputs with a canonical intent query,
//! and otherwise delegates to a language-model collaborator. Every
//! failure path falls back to the original current query so retrieval
//! is never blocked on the model.

use crate::config::QueryRewriteConfig;
use crate::error::{RagfuseError, Result};
use crate::retrieval::ChatTurn;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const HISTORY_START: &str = "===HISTORY_START===";
pub const HISTORY_END: &str = "===HISTORY_END===";
pub const CURRENT_QUERY: &str = "===CURRENT_QUERY===";

const DEFAULT_PROMPT_TEMPLATE: &str = "\
Given the conversation so far and a follow-up question, rewrite the \
question as a standalone search query. Resolve pronouns and elliptical \
references from the conversation, keep the language of the question, \
and return only the rewritten query.

Conversation:
{history}

Question:
{query}
";

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Rewrite model call failed: {0}")]
    Model(String),

    #[error("Rewrite model returned empty output")]
    EmptyOutput,
}

/// Language-model collaborator used for query rewriting
#[async_trait]
pub trait RewriteModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, RewriteError>;
}

/// Split a sentinel-delimited input into (history, current query).
///
/// When any marker is missing the whole input is the current query with
/// empty history.
pub fn split_history(raw: &str) -> (&str, &str) {
    let (Some(start), Some(end), Some(query)) = (
        raw.find(HISTORY_START),
        raw.find(HISTORY_END),
        raw.find(CURRENT_QUERY),
    ) else {
        return ("", raw.trim());
    };

    let history_from = start + HISTORY_START.len();
    if history_from > end || end > query {
        return ("", raw.trim());
    }

    let history = raw[history_from..end].trim();
    let current = raw[query + CURRENT_QUERY.len()..].trim();
    (history, current)
}

/// Build the sentinel-delimited format that [`split_history`] parses.
pub fn format_query_with_history(history: &[ChatTurn], current_query: &str) -> String {
    let mut formatted = String::new();
    formatted.push_str(HISTORY_START);
    formatted.push('\n');
    for turn in history {
        formatted.push_str(&turn.role.to_string());
        formatted.push(':');
        formatted.push_str(&turn.text);
        formatted.push('\n');
    }
    formatted.push_str(HISTORY_END);
    formatted.push('\n');
    formatted.push_str(CURRENT_QUERY);
    formatted.push('\n');
    formatted.push_str(current_query);
    formatted
}

/// Normalizes the incoming query using prior turns.
pub struct QueryRewriter {
    model: Option<Arc<dyn RewriteModel>>,
    template: String,
    enabled: bool,
    timeout: Duration,
    greeting: Regex,
    numeric: Regex,
}

impl QueryRewriter {
    pub fn new(
        config: &QueryRewriteConfig,
        model: Option<Arc<dyn RewriteModel>>,
    ) -> Result<Self> {
        let template = match &config.prompt_template {
            Some(path) => std::fs::read_to_string(path).map_err(|e| RagfuseError::Io {
                source: e,
                context: format!("Failed to read prompt template: {:?}", path),
            })?,
            None => DEFAULT_PROMPT_TEMPLATE.to_string(),
        };

        Ok(Self {
            model,
            template,
            enabled: config.enabled,
            timeout: Duration::from_millis(config.timeout_ms),
            greeting: compile(r"^(你好|您好|hi|hello|在吗|有人吗)$")?,
            numeric: compile(r"^\d+$")?,
        })
    }

    /// Rewrite `raw` into the effective query. Infallible: model
    /// errors, timeouts, and empty outputs all fall back to the
    /// original current query.
    pub async fn rewrite(&self, raw: &str) -> String {
        let (history, current) = split_history(raw);

        if let Some(canonical) = self.short_circuit(current) {
            tracing::debug!(from = current, to = %canonical, "query short-circuited");
            return canonical;
        }

        if !self.enabled {
            return current.to_string();
        }
        let Some(model) = &self.model else {
            return current.to_string();
        };

        let prompt = self
            .template
            .replace("{history}", history)
            .replace("{query}", current);

        match tokio::time::timeout(self.timeout, model.complete(&prompt)).await {
            Ok(Ok(rewritten)) => {
                let rewritten = rewritten.trim();
                if rewritten.is_empty() {
                    tracing::warn!("rewrite model returned empty output, keeping original query");
                    current.to_string()
                } else {
                    tracing::debug!(from = current, to = rewritten, "query rewritten");
                    rewritten.to_string()
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("query rewrite failed, keeping original query: {e}");
                current.to_string()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "query rewrite timed out, keeping original query"
                );
                current.to_string()
            }
        }
    }

    /// Canonical queries for trivially classifiable inputs, checked
    /// before any model call. Matchers are bilingual; canonical intent
    /// strings mirror the indexed corpus.
    fn short_circuit(&self, query: &str) -> Option<String> {
        let clean = query.trim().to_lowercase();

        if self.greeting.is_match(&clean) {
            return Some("customer service greeting".to_string());
        }
        if self.numeric.is_match(&clean) {
            return Some(format!("loan amount {clean}"));
        }
        if ["借不了", "借不到", "can't borrow", "cannot borrow"]
            .iter()
            .any(|t| clean.contains(t))
        {
            return Some("loan failure reasons".to_string());
        }
        if ["提额", "raise my limit", "increase my limit"]
            .iter()
            .any(|t| clean.contains(t))
        {
            return Some("credit limit increase".to_string());
        }
        if ["提前还", "early repayment", "repay early"]
            .iter()
            .any(|t| clean.contains(t))
        {
            return Some("early repayment".to_string());
        }
        if clean.contains("额度") && clean.chars().count() < 5 {
            return Some("credit limit inquiry".to_string());
        }
        None
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| RagfuseError::Config(format!("invalid pattern: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Role;

    struct FixedModel(String);

    #[async_trait]
    impl RewriteModel for FixedModel {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, RewriteError> {
            Ok(self.0.clone())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl RewriteModel for FailingModel {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, RewriteError> {
            Err(RewriteError::Model("connection refused".to_string()))
        }
    }

    struct SlowModel;

    #[async_trait]
    impl RewriteModel for SlowModel {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, RewriteError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("too late".to_string())
        }
    }

    fn rewriter(model: Option<Arc<dyn RewriteModel>>) -> QueryRewriter {
        let config = QueryRewriteConfig {
            enabled: true,
            timeout_ms: 50,
            prompt_template: None,
        };
        QueryRewriter::new(&config, model).unwrap()
    }

    #[test]
    fn test_split_without_markers() {
        let (history, current) = split_history("  what about the rate?  ");
        assert_eq!(history, "");
        assert_eq!(current, "what about the rate?");
    }

    #[test]
    fn test_split_with_markers() {
        let turns = vec![
            ChatTurn::new(Role::User, "I want a loan"),
            ChatTurn::new(Role::Assistant, "How much do you need?"),
        ];
        let formatted = format_query_with_history(&turns, "what about the rate?");
        let (history, current) = split_history(&formatted);
        assert!(history.contains("USER:I want a loan"));
        assert!(history.contains("ASSISTANT:How much do you need?"));
        assert_eq!(current, "what about the rate?");
    }

    #[test]
    fn test_split_with_out_of_order_markers() {
        let raw = format!("{CURRENT_QUERY} x {HISTORY_END} y {HISTORY_START}");
        let (history, current) = split_history(&raw);
        assert_eq!(history, "");
        assert_eq!(current, raw.trim());
    }

    #[tokio::test]
    async fn test_greeting_short_circuit() {
        let rewriter = rewriter(None);
        assert_eq!(rewriter.rewrite("hello").await, "customer service greeting");
        assert_eq!(rewriter.rewrite("你好").await, "customer service greeting");
        assert_eq!(rewriter.rewrite(" Hi ").await, "customer service greeting");
    }

    #[tokio::test]
    async fn test_numeric_short_circuit() {
        let rewriter = rewriter(None);
        assert_eq!(rewriter.rewrite("50000").await, "loan amount 50000");
    }

    #[tokio::test]
    async fn test_fuzzy_intent_short_circuits() {
        let rewriter = rewriter(None);
        assert_eq!(
            rewriter.rewrite("why can't borrow anything").await,
            "loan failure reasons"
        );
        assert_eq!(
            rewriter.rewrite("please raise my limit").await,
            "credit limit increase"
        );
        assert_eq!(
            rewriter.rewrite("提前还款怎么操作").await,
            "early repayment"
        );
        assert_eq!(rewriter.rewrite("额度?").await, "credit limit inquiry");
    }

    #[tokio::test]
    async fn test_short_circuit_applies_to_current_query_only() {
        let turns = vec![ChatTurn::new(Role::User, "some earlier question")];
        let formatted = format_query_with_history(&turns, "hello");
        let rewriter = rewriter(None);
        assert_eq!(
            rewriter.rewrite(&formatted).await,
            "customer service greeting"
        );
    }

    #[tokio::test]
    async fn test_model_rewrite_used_verbatim() {
        let rewriter = rewriter(Some(Arc::new(FixedModel(
            "loan interest rate for 12 months".to_string(),
        ))));
        assert_eq!(
            rewriter.rewrite("what about the rate?").await,
            "loan interest rate for 12 months"
        );
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_original() {
        let rewriter = rewriter(Some(Arc::new(FailingModel)));
        assert_eq!(
            rewriter.rewrite("what about the rate?").await,
            "what about the rate?"
        );
    }

    #[tokio::test]
    async fn test_model_timeout_falls_back_to_original() {
        let rewriter = rewriter(Some(Arc::new(SlowModel)));
        assert_eq!(
            rewriter.rewrite("what about the rate?").await,
            "what about the rate?"
        );
    }

    #[tokio::test]
    async fn test_empty_model_output_falls_back() {
        let rewriter = rewriter(Some(Arc::new(FixedModel("   ".to_string()))));
        assert_eq!(
            rewriter.rewrite("what about the rate?").await,
            "what about the rate?"
        );
    }

    #[tokio::test]
    async fn test_disabled_strips_history_without_model_call() {
        let config = QueryRewriteConfig {
            enabled: false,
            timeout_ms: 50,
            prompt_template: None,
        };
        let rewriter = QueryRewriter::new(
            &config,
            Some(Arc::new(FixedModel("should not be used".to_string()))),
        )
        .unwrap();

        let formatted =
            format_query_with_history(&[ChatTurn::new(Role::User, "hi")], "what about the rate?");
        assert_eq!(rewriter.rewrite(&formatted).await, "what about the rate?");
    }

    #[tokio::test]
    async fn test_no_model_falls_back_to_current_query() {
        let rewriter = rewriter(None);
        assert_eq!(
            rewriter.rewrite("what about the rate?").await,
            "what about the rate?"
        );
    }
}
