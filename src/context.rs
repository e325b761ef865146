//! Prompt context assembly under a token budget

use crate::chunking::estimate_tokens;
use crate::config::ContextConfig;
use crate::models::{BuiltContext, ContextSource, SearchResult};
use tracing::debug;

const ENTRY_SEPARATOR: &str = "\n\n---\n\n";

/// Assembles retrieval results into cited prompt context
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Build context from results already sorted by relevance
    ///
    /// The effective relevance floor is the larger of the absolute minimum
    /// and `top_score * adaptive_ratio`. Citation indices are 1-based and
    /// contiguous: skipping a low-score entry does not advance them.
    pub fn build(&self, results: &[SearchResult]) -> BuiltContext {
        let Some(top) = results.first() else {
            return BuiltContext::empty();
        };

        let floor = self
            .config
            .min_relevance_score
            .max(top.score * self.config.adaptive_ratio);

        let mut context_text = String::new();
        let mut sources = Vec::new();
        let mut estimated_tokens = 0usize;

        for result in results {
            if result.score < floor {
                continue;
            }

            let citation = sources.len() + 1;
            let entry = format_entry(citation, result);

            let separator_tokens = if sources.is_empty() {
                0
            } else {
                estimate_tokens(ENTRY_SEPARATOR)
            };
            let entry_tokens = estimate_tokens(&entry) + separator_tokens;

            if estimated_tokens + entry_tokens > self.config.max_tokens {
                break;
            }

            if !sources.is_empty() {
                context_text.push_str(ENTRY_SEPARATOR);
            }
            context_text.push_str(&entry);
            estimated_tokens += entry_tokens;

            sources.push(ContextSource {
                index: citation,
                document_id: result.document.id,
                document_name: result.document.name.clone(),
                document_type: result.document.document_type,
                page_number: result.chunk.page_number,
                section: result.chunk.section.clone(),
                relevance_score: result.score,
            });
        }

        debug!(
            "Built context with {} chunks, ~{} tokens (floor {:.2})",
            sources.len(),
            estimated_tokens,
            floor
        );

        BuiltContext {
            context_text,
            chunks_used: sources.len(),
            sources,
            estimated_tokens,
        }
    }
}

/// Header line `[i] name [- section] [(p. N)]` followed by the content
fn format_entry(citation: usize, result: &SearchResult) -> String {
    let mut header = format!("[{}] {}", citation, result.document.name);
    if let Some(section) = &result.chunk.section {
        header.push_str(&format!(" - {}", section));
    }
    if let Some(page) = result.chunk.page_number {
        header.push_str(&format!(" (p. {})", page));
    }
    format!("{}\n{}", header, result.chunk.content)
}
