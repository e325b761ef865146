//! Provider-agnostic language model abstraction
//!
//! All generation in the service goes through [`LlmProvider`]: plain and
//! streamed completion over a prompt or a conversation, plus a health probe.
//! Two providers are supplied: a local HTTP JSON server speaking NDJSON
//! streams and the Anthropic messages API speaking SSE.

pub mod providers;

use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

pub use providers::{create_provider, AnthropicProvider, LocalProvider};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Per-call generation options
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Sampling temperature; provider default when absent
    pub temperature: Option<f32>,

    /// Output token cap; provider default when absent
    pub max_tokens: Option<u32>,

    /// Per-request timeout override in seconds
    pub timeout: Option<u64>,
}

impl ChatOptions {
    /// Deterministic sampling, used by the response generator
    pub fn deterministic() -> Self {
        Self {
            temperature: Some(0.0),
            ..Self::default()
        }
    }
}

/// Token accounting reported by a provider, when available
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Response from text generation
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// Stream of incremental text deltas from a provider
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Generate text from a conversation
    async fn chat(&self, messages: &[Message], options: &ChatOptions)
        -> Result<GenerationResponse>;

    /// Stream text deltas from a conversation
    ///
    /// Dropping the stream, or cancelling the token, aborts the in-flight
    /// HTTP request.
    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> Result<TextStream>;

    /// Generate text from a bare prompt
    async fn generate(&self, prompt: &str, options: &ChatOptions) -> Result<GenerationResponse> {
        self.chat(&[user_message(prompt)], options).await
    }

    /// Stream text deltas from a bare prompt
    async fn generate_stream(
        &self,
        prompt: &str,
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> Result<TextStream> {
        self.chat_stream(&[user_message(prompt)], options, cancel)
            .await
    }

    /// Test if the provider is accessible
    async fn health_check(&self) -> Result<bool>;
}

/// Helper function to create a system message
pub fn system_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::System,
        content: content.into(),
    }
}

/// Helper function to create a user message
pub fn user_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::User,
        content: content.into(),
    }
}

/// Helper function to create an assistant message
pub fn assistant_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::Assistant,
        content: content.into(),
    }
}
