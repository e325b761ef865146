//! Grounded answer generation with confidence scoring

use crate::error::Result;
use crate::llm::{
    assistant_message, system_message, user_message, ChatOptions, LlmProvider, TokenUsage,
};
use crate::models::{BuiltContext, ContextSource, ConversationMessage, MessageRole};
use std::sync::Arc;
use tracing::debug;

/// Phrases whose presence marks an answer as unanswerable
const UNANSWERABLE_PHRASES: &[&str] = &[
    "i don't have enough information",
    "i do not have enough information",
    "not mentioned in",
    "no information about",
    "not found in the",
    "cannot find",
    "no relevant context",
    "cannot answer this question",
];

/// Maximum prior messages carried into the prompt
const MAX_HISTORY_MESSAGES: usize = 10;

const ANSWER_SYSTEM_PROMPT: &str = "You are a campaign lore assistant. Answer strictly from \
the supplied source passages. Quote numeric and mechanical values verbatim. Cite every claim \
with the bracketed marker of its passage, like [1]. If the sources are insufficient, begin \
with \"I don't have enough information\" and describe what is missing. If sources conflict, \
present both and cite each.";

/// A generated answer with its confidence assessment
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<ContextSource>,
    pub is_unanswerable: bool,
    pub usage: Option<TokenUsage>,
}

/// Prompts the LLM with built context and scores the result
pub struct ResponseGenerator {
    provider: Arc<dyn LlmProvider>,
}

impl ResponseGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Generate an answer grounded in the built context
    pub async fn generate(
        &self,
        question: &str,
        context: &BuiltContext,
        history: &[ConversationMessage],
    ) -> Result<GeneratedAnswer> {
        let mut messages = vec![system_message(ANSWER_SYSTEM_PROMPT)];

        let history_tail = history
            .len()
            .saturating_sub(MAX_HISTORY_MESSAGES);
        for message in &history[history_tail..] {
            messages.push(match message.role {
                MessageRole::User => user_message(message.content.clone()),
                MessageRole::Assistant => assistant_message(message.content.clone()),
                MessageRole::System => system_message(message.content.clone()),
            });
        }

        messages.push(user_message(build_user_prompt(question, context)));

        let response = self
            .provider
            .chat(&messages, &ChatOptions::deterministic())
            .await?;

        let answer = response.text.trim().to_string();
        let unanswerable = is_unanswerable(&answer);
        let confidence = confidence_score(&context.sources, unanswerable);

        debug!(
            "Generated answer (confidence {:.2}, unanswerable: {})",
            confidence, unanswerable
        );

        Ok(GeneratedAnswer {
            answer,
            confidence,
            sources: context.sources.clone(),
            is_unanswerable: unanswerable,
            usage: response.usage,
        })
    }
}

/// Format the user message: context, source legend, and the question
fn build_user_prompt(question: &str, context: &BuiltContext) -> String {
    if context.chunks_used == 0 {
        return format!(
            "No relevant context was found in the campaign documents.\n\nQuestion: {}",
            question
        );
    }

    let mut legend = String::from("Sources:\n");
    for source in &context.sources {
        legend.push_str(&format!("[{}] {}", source.index, source.document_name));
        if let Some(section) = &source.section {
            legend.push_str(&format!(" - {}", section));
        }
        if let Some(page) = source.page_number {
            legend.push_str(&format!(" (p. {})", page));
        }
        legend.push('\n');
    }

    format!(
        "Context:\n{}\n\n{}\nQuestion: {}",
        context.context_text, legend, question
    )
}

/// Case-insensitive match against the closed unanswerable phrase set
pub fn is_unanswerable(answer: &str) -> bool {
    let lowered = answer.to_lowercase();
    UNANSWERABLE_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

/// Heuristic confidence in [0, 1]
///
/// No sources scores 0.1; a detected unanswerable answer 0.15. Otherwise
/// the top score, average relevance, and source count combine into
/// `top*0.5 + avg*0.3 + min(n-1, 3)*0.05 + 0.05`.
pub fn confidence_score(sources: &[ContextSource], unanswerable: bool) -> f32 {
    if sources.is_empty() {
        return 0.1;
    }
    if unanswerable {
        return 0.15;
    }

    let top = sources
        .iter()
        .map(|s| s.relevance_score)
        .fold(0.0f32, f32::max);
    let avg = sources.iter().map(|s| s.relevance_score).sum::<f32>() / sources.len() as f32;
    let count_bonus = ((sources.len() - 1).min(3)) as f32 * 0.05;

    (top * 0.5 + avg * 0.3 + count_bonus + 0.05).clamp(0.0, 1.0)
}
