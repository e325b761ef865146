//! LLM-scored reordering of retrieval candidates

use crate::error::{LoreError, Result};
use crate::llm::{system_message, user_message, ChatOptions, LlmProvider};
use crate::models::SearchResult;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const RERANK_SYSTEM_PROMPT: &str = "You score how relevant each numbered passage is to the \
question, from 1 (irrelevant) to 10 (directly answers it). Respond with JSON only: an array \
of objects like [{\"index\": 1, \"score\": 8}]. Score every passage.";

const RERANK_TEMPERATURE: f32 = 0.1;

/// One scored entry in the model's response
#[derive(Debug, Deserialize)]
struct RerankEntry {
    index: usize,
    score: f32,
}

/// Second-stage reordering of top-K candidates
pub struct Reranker {
    provider: Arc<dyn LlmProvider>,
    drop_threshold: f32,
}

impl Reranker {
    pub fn new(provider: Arc<dyn LlmProvider>, drop_threshold: f32) -> Self {
        Self {
            provider,
            drop_threshold,
        }
    }

    /// Rescore candidates against the question
    ///
    /// Returns `RERANK_FAILED` when the model output cannot be parsed; the
    /// caller may fall back to the input ordering.
    pub async fn rerank(
        &self,
        question: &str,
        candidates: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut listing = String::new();
        for (i, candidate) in candidates.iter().enumerate() {
            listing.push_str(&format!("[{}] {}\n\n", i + 1, candidate.chunk.content));
        }

        let messages = vec![
            system_message(RERANK_SYSTEM_PROMPT),
            user_message(format!("Question: {}\n\nPassages:\n{}", question, listing)),
        ];

        let options = ChatOptions {
            temperature: Some(RERANK_TEMPERATURE),
            ..ChatOptions::default()
        };

        let response = self.provider.chat(&messages, &options).await?;
        let entries = parse_scores(&response.text)?;

        let mut reranked: Vec<SearchResult> = Vec::with_capacity(candidates.len());
        let mut candidates: Vec<Option<SearchResult>> = candidates.into_iter().map(Some).collect();

        for entry in entries {
            // The prompt numbers passages from 1
            let Some(slot) = entry
                .index
                .checked_sub(1)
                .and_then(|i| candidates.get_mut(i))
            else {
                warn!("Rerank response referenced unknown index {}", entry.index);
                continue;
            };
            let Some(mut candidate) = slot.take() else {
                continue;
            };

            let rescaled = (entry.score / 10.0).clamp(0.0, 1.0);
            if rescaled < self.drop_threshold {
                debug!(
                    "Dropping candidate {} with rerank score {:.2}",
                    candidate.chunk.id, rescaled
                );
                continue;
            }

            candidate.score = rescaled;
            reranked.push(candidate);
        }

        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(reranked)
    }
}

/// Parse the model's score array, tolerating markdown fences
fn parse_scores(raw: &str) -> Result<Vec<RerankEntry>> {
    let stripped = strip_code_fences(raw);

    let value: serde_json::Value = serde_json::from_str(stripped)
        .map_err(|e| LoreError::Rerank(format!("Unparseable rerank response: {}", e)))?;

    if !value.is_array() {
        return Err(LoreError::Rerank(
            "Rerank response is not an array".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| LoreError::Rerank(format!("Malformed rerank entries: {}", e)))
}

/// Remove a surrounding ```/```json fence if present
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string on the opening fence line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };

    rest.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let entries = parse_scores(r#"[{"index": 1, "score": 8}, {"index": 2, "score": 3}]"#).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 1);
        assert!((entries[0].score - 8.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_fenced_array() {
        let raw = "```json\n[{\"index\": 1, \"score\": 9.5}]\n```";
        let entries = parse_scores(raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert!((entries[0].score - 9.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(matches!(
            parse_scores(r#"{"index": 1, "score": 8}"#),
            Err(LoreError::Rerank(_))
        ));
        assert!(matches!(
            parse_scores("I think passage 1 is best"),
            Err(LoreError::Rerank(_))
        ));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("[1]"), "[1]");
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  [1]  "), "[1]");
    }
}
