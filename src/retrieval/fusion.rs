//! Reciprocal Rank Fusion for combining ranked channel results

use crate::retrieval::Document;
use ahash::AHashMap;
use sha2::{Digest, Sha256};

/// One fused candidate with its accumulated RRF score
#[derive(Debug, Clone)]
pub struct FusionEntry {
    pub document: Document,
    pub score: f64,
}

/// Stable deduplication key for a document within one pipeline run.
///
/// Priority order, first non-empty value wins: explicit id, then the
/// metadata keys `id`, `uri`, `source`, `canonical_id`, and finally a
/// SHA-256 hex digest of the text. The hash fallback guarantees that
/// identical text surfaced by two channels fuses into one entry even
/// when all identifying metadata is missing.
pub fn fusion_key(document: &Document) -> String {
    if let Some(id) = &document.id {
        if !id.is_empty() {
            return id.clone();
        }
    }
    for key in ["id", "uri", "source", "canonical_id"] {
        if let Some(value) = document.metadata.get(key) {
            let text = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !text.is_empty() {
                return text;
            }
        }
    }
    hex::encode(Sha256::digest(document.text.as_bytes()))
}

/// Merge ranked channel results with Reciprocal Rank Fusion.
///
/// Each channel contributes `1 / (rrf_k + rank)` per document, rank
/// starting at 1 for the channel's best hit; contributions accumulate
/// additively under the [`fusion_key`] identity, so a document surfaced
/// by several channels is boosted by their sum. Entries are sorted by
/// descending score and truncated to `limit`; ties keep first-seen
/// order, which is why callers must pass channels in a fixed order.
pub fn reciprocal_rank_fusion(
    channels: &[(&str, Vec<Document>)],
    rrf_k: f64,
    limit: usize,
) -> Vec<FusionEntry> {
    let mut slots: AHashMap<String, usize> = AHashMap::new();
    let mut entries: Vec<FusionEntry> = Vec::new();

    for (channel, documents) in channels {
        tracing::debug!(channel, results = documents.len(), "fusing channel");
        for (position, document) in documents.iter().enumerate() {
            let contribution = 1.0 / (rrf_k + position as f64 + 1.0);
            let key = fusion_key(document);
            match slots.get(&key) {
                Some(&slot) => entries[slot].score += contribution,
                None => {
                    slots.insert(key, entries.len());
                    entries.push(FusionEntry {
                        document: document.clone(),
                        score: contribution,
                    });
                }
            }
        }
    }

    // Stable sort: equal scores keep first-seen order, so repeated runs
    // over identical inputs produce identical output.
    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    entries.truncate(limit);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        Document::with_id(id, format!("text for {id}"))
    }

    #[test]
    fn test_worked_example() {
        // keyword [A, B, C], vector [B, D], rrf_k = 60
        let keyword = vec![doc("A"), doc("B"), doc("C")];
        let vector = vec![doc("B"), doc("D")];

        let fused = reciprocal_rank_fusion(
            &[("keyword", keyword), ("vector", vector)],
            60.0,
            10,
        );

        let order: Vec<&str> = fused
            .iter()
            .map(|e| e.document.id.as_deref().unwrap())
            .collect();
        assert_eq!(order, vec!["B", "A", "D", "C"]);

        // B appears at rank 2 (keyword) and rank 1 (vector)
        let expected_b = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((fused[0].score - expected_b).abs() < 1e-12);
        assert!((fused[1].score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[2].score - 1.0 / 62.0).abs() < 1e-12);
        assert!((fused[3].score - 1.0 / 63.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_channel_score_is_single_contribution() {
        let fused = reciprocal_rank_fusion(&[("keyword", vec![doc("A")])], 60.0, 10);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_rank_monotonic_within_channel() {
        let fused = reciprocal_rank_fusion(&[("keyword", vec![doc("A"), doc("B")])], 60.0, 10);
        assert!(fused[0].score > fused[1].score);
        assert_eq!(fused[0].document.id.as_deref(), Some("A"));
    }

    #[test]
    fn test_tie_break_keeps_first_seen_order() {
        // Both documents take rank 1 in their channel, so scores tie;
        // the keyword channel is processed first.
        let fused = reciprocal_rank_fusion(
            &[("keyword", vec![doc("X")]), ("vector", vec![doc("Y")])],
            60.0,
            10,
        );
        assert_eq!(fused[0].document.id.as_deref(), Some("X"));
        assert_eq!(fused[1].document.id.as_deref(), Some("Y"));
    }

    #[test]
    fn test_truncates_to_limit() {
        let keyword = vec![doc("A"), doc("B"), doc("C"), doc("D")];
        let fused = reciprocal_rank_fusion(&[("keyword", keyword)], 60.0, 2);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_empty_channels() {
        let fused = reciprocal_rank_fusion(&[("keyword", vec![]), ("vector", vec![])], 60.0, 5);
        assert!(fused.is_empty());
    }

    #[test]
    fn test_key_prefers_explicit_id() {
        let d = Document::with_id("doc-1", "body").meta("uri", "https://example.com/a");
        assert_eq!(fusion_key(&d), "doc-1");
    }

    #[test]
    fn test_key_metadata_priority_order() {
        let d = Document::new("body")
            .meta("canonical_id", "canon")
            .meta("uri", "https://example.com/a");
        assert_eq!(fusion_key(&d), "https://example.com/a");

        let d = Document::new("body").meta("source", "faq.md");
        assert_eq!(fusion_key(&d), "faq.md");
    }

    #[test]
    fn test_key_skips_empty_and_null_metadata() {
        let d = Document::new("body")
            .meta("id", "")
            .meta("uri", serde_json::Value::Null)
            .meta("source", "faq.md");
        assert_eq!(fusion_key(&d), "faq.md");
    }

    #[test]
    fn test_key_falls_back_to_content_hash() {
        let a = Document::new("same text");
        let b = Document::new("same text");
        let c = Document::new("different text");
        assert_eq!(fusion_key(&a), fusion_key(&b));
        assert_ne!(fusion_key(&a), fusion_key(&c));
        // hex digest of the text, stable across runs
        assert_eq!(fusion_key(&a).len(), 64);
    }

    #[test]
    fn test_identical_text_from_two_channels_fuses() {
        let keyword = vec![Document::new("shared answer")];
        let vector = vec![Document::new("shared answer")];
        let fused = reciprocal_rank_fusion(
            &[("keyword", keyword), ("vector", vector)],
            60.0,
            10,
        );
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-12);
    }
}
