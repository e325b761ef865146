//! Local HTTP JSON provider
//!
//! Speaks the Ollama-style chat API: plain JSON for one-shot calls and
//! newline-delimited JSON frames when streaming.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::providers::base::{spawn_line_stream, HttpProviderClient, LineEvent};
use crate::llm::{
    ChatOptions, GenerationResponse, LlmProvider, Message, TextStream, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Chat request sent to the local server
#[derive(Debug, Serialize)]
struct LocalChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: LocalOptions,
}

#[derive(Debug, Serialize)]
struct LocalOptions {
    num_predict: u32,
    temperature: f32,
}

/// One chat response, or one NDJSON frame when streaming
#[derive(Debug, Deserialize)]
struct LocalChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: Option<LocalChatMessage>,
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LocalChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct LocalModelsResponse {
    models: Vec<LocalModelInfo>,
}

#[derive(Debug, Deserialize)]
struct LocalModelInfo {
    #[allow(dead_code)]
    name: String,
}

/// Provider backed by a local HTTP JSON model server
pub struct LocalProvider {
    client: HttpProviderClient,
    config: LlmConfig,
}

impl LocalProvider {
    pub fn new(config: LlmConfig) -> Self {
        let client = HttpProviderClient::new(config.timeout);
        Self { client, config }
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/api/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        )
    }

    fn build_request(&self, messages: &[Message], options: &ChatOptions, stream: bool) -> LocalChatRequest {
        LocalChatRequest {
            model: self.config.chat_model.clone(),
            messages: messages.to_vec(),
            stream,
            options: LocalOptions {
                num_predict: options.max_tokens.unwrap_or(self.config.max_tokens),
                temperature: options.temperature.unwrap_or(self.config.temperature),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<GenerationResponse> {
        debug!("Local chat with {} messages", messages.len());

        let request = self.build_request(messages, options, false);
        let response: LocalChatResponse = self
            .client
            .post_json(&self.api_url("chat"), &request, &[], options.timeout)
            .await?;

        if !response.done {
            return Err(LlmError::InvalidResponse("Incomplete response".to_string()).into());
        }

        let text = response
            .message
            .map(|m| m.content)
            .ok_or_else(|| LlmError::InvalidResponse("No message in response".to_string()))?;

        info!("Generated {} tokens", response.eval_count.unwrap_or(0));

        let usage = response.eval_count.map(|output| TokenUsage {
            input_tokens: response.prompt_eval_count.unwrap_or(0),
            output_tokens: output,
        });

        Ok(GenerationResponse {
            text,
            model: response
                .model
                .unwrap_or_else(|| self.config.chat_model.clone()),
            usage,
            finish_reason: response.done_reason,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> Result<TextStream> {
        debug!("Local streaming chat with {} messages", messages.len());

        let request = self.build_request(messages, options, true);
        let response = self
            .client
            .post_stream(&self.api_url("chat"), &request, &[])
            .await?;

        Ok(spawn_line_stream(response, cancel, |line| {
            match serde_json::from_str::<LocalChatResponse>(line) {
                Ok(frame) if frame.done => LineEvent::Done,
                Ok(frame) => match frame.message {
                    Some(m) if !m.content.is_empty() => LineEvent::Delta(m.content),
                    _ => LineEvent::Skip,
                },
                Err(e) => LineEvent::Fail(LlmError::InvalidResponse(e.to_string())),
            }
        }))
    }

    async fn health_check(&self) -> Result<bool> {
        match self
            .client
            .get::<LocalModelsResponse>(&self.api_url("tags"), &[])
            .await
        {
            Ok(models) => Ok(!models.models.is_empty()),
            Err(_) => Ok(false),
        }
    }
}
