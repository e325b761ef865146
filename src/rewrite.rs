//! Follow-up query rewriting
//!
//! Collapses a referential follow-up ("tell me more") into a standalone
//! search query using the conversation history. Rewriting is strictly
//! best-effort: any failure falls back to the original question.

use crate::llm::{system_message, user_message, ChatOptions, LlmProvider, Message, Role};
use crate::models::{ConversationMessage, MessageRole};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const REWRITE_SYSTEM_PROMPT: &str = "You rewrite the latest user message into a standalone \
search query. Use the conversation to resolve pronouns and references. Preserve names, \
numbers, and specifics exactly. Output only the rewritten query, nothing else.";

const REWRITE_MAX_TOKENS: u32 = 200;
const REWRITE_TEMPERATURE: f32 = 0.1;

/// Rewrites follow-up questions into standalone queries
pub struct QueryRewriter {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl QueryRewriter {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout_secs: u64) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Produce a standalone query for the question
    ///
    /// Without history the question is already standalone and returned
    /// unchanged.
    pub async fn rewrite(&self, question: &str, history: &[ConversationMessage]) -> String {
        if history.is_empty() {
            return question.to_string();
        }

        let mut messages = vec![system_message(REWRITE_SYSTEM_PROMPT)];
        messages.extend(history.iter().map(to_llm_message));
        messages.push(user_message(format!(
            "Rewrite into a standalone search query: {}",
            question
        )));

        let options = ChatOptions {
            temperature: Some(REWRITE_TEMPERATURE),
            max_tokens: Some(REWRITE_MAX_TOKENS),
            timeout: Some(self.timeout.as_secs()),
        };

        let result = tokio::time::timeout(self.timeout, self.provider.chat(&messages, &options)).await;

        match result {
            Ok(Ok(response)) => {
                let rewritten = response.text.trim().to_string();
                if rewritten.is_empty() {
                    warn!("Rewriter returned empty output, keeping original question");
                    question.to_string()
                } else {
                    debug!("Rewrote {:?} into {:?}", question, rewritten);
                    rewritten
                }
            }
            Ok(Err(e)) => {
                warn!("Query rewriting failed, keeping original question: {}", e);
                question.to_string()
            }
            Err(_) => {
                warn!("Query rewriting timed out, keeping original question");
                question.to_string()
            }
        }
    }
}

fn to_llm_message(message: &ConversationMessage) -> Message {
    Message {
        role: match message.role {
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Assistant,
            MessageRole::System => Role::System,
        },
        content: message.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, Result};
    use crate::llm::{GenerationResponse, TextStream};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    /// Provider stub answering with a fixed script (or failing)
    struct ScriptedProvider {
        reply: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, _: &[Message], _: &ChatOptions) -> Result<GenerationResponse> {
            match &self.reply {
                Some(text) => Ok(GenerationResponse {
                    text: text.clone(),
                    model: "scripted".to_string(),
                    usage: None,
                    finish_reason: None,
                }),
                None => Err(LlmError::GenerationFailed("scripted failure".to_string()).into()),
            }
        }

        async fn chat_stream(
            &self,
            _: &[Message],
            _: &ChatOptions,
            _: CancellationToken,
        ) -> Result<TextStream> {
            unimplemented!("not used in rewriter tests")
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn history() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::user("Who is Strahd?"),
            ConversationMessage::assistant("Strahd is the vampire lord of Barovia."),
        ]
    }

    #[tokio::test]
    async fn test_no_history_returns_question_unchanged() {
        let rewriter = QueryRewriter::new(
            Arc::new(ScriptedProvider {
                reply: Some("should never be used".to_string()),
            }),
            15,
        );
        let result = rewriter.rewrite("Who is Strahd?", &[]).await;
        assert_eq!(result, "Who is Strahd?");
    }

    #[tokio::test]
    async fn test_rewrites_follow_up() {
        let rewriter = QueryRewriter::new(
            Arc::new(ScriptedProvider {
                reply: Some("Strahd vampire lord weaknesses and history".to_string()),
            }),
            15,
        );
        let result = rewriter.rewrite("tell me more", &history()).await;
        assert!(result.contains("Strahd"));
        assert_ne!(result, "tell me more");
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_original() {
        let rewriter = QueryRewriter::new(Arc::new(ScriptedProvider { reply: None }), 15);
        let result = rewriter.rewrite("tell me more", &history()).await;
        assert_eq!(result, "tell me more");
    }

    #[tokio::test]
    async fn test_blank_output_falls_back_to_original() {
        let rewriter = QueryRewriter::new(
            Arc::new(ScriptedProvider {
                reply: Some("   \n".to_string()),
            }),
            15,
        );
        let result = rewriter.rewrite("tell me more", &history()).await;
        assert_eq!(result, "tell me more");
    }
}
