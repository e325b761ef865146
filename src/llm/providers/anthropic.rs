//! Anthropic Claude provider implementation
//!
//! Anthropic uses a different message format than the local server: the
//! system prompt travels out-of-band and streaming arrives as SSE frames.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::providers::base::{spawn_line_stream, HttpProviderClient, LineEvent};
use crate::llm::{
    ChatOptions, GenerationResponse, LlmProvider, Message, Role, TextStream, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic message format
#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

impl From<&Message> for AnthropicMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: match msg.role {
                Role::Assistant => "assistant".to_string(),
                // System messages are extracted before conversion
                Role::User | Role::System => "user".to_string(),
            },
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    input_tokens: u32,
    output_tokens: u32,
}

/// One SSE `data:` payload from the streaming messages API
#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[allow(dead_code)]
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[allow(dead_code)]
    id: String,
}

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: HttpProviderClient,
    config: LlmConfig,
}

impl AnthropicProvider {
    pub fn new(config: LlmConfig) -> Self {
        let client = HttpProviderClient::new(config.timeout);
        Self { client, config }
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable
    pub fn from_env(chat_model: String) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            crate::error::LoreError::Config(
                "ANTHROPIC_API_KEY environment variable not set".to_string(),
            )
        })?;

        Ok(Self::new(LlmConfig {
            provider: "anthropic".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key: Some(api_key),
            chat_model,
            max_tokens: 4096,
            temperature: 0.7,
            timeout: 120,
        }))
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("content-type", "application/json".to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ];
        if let Some(api_key) = &self.config.api_key {
            headers.push(("x-api-key", api_key.clone()));
        }
        headers
    }

    fn build_request(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        stream: bool,
    ) -> Result<AnthropicRequest> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone());

        let anthropic_messages: Vec<AnthropicMessage> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(AnthropicMessage::from)
            .collect();

        if anthropic_messages.is_empty() {
            return Err(LlmError::InvalidResponse("No messages to send".to_string()).into());
        }

        Ok(AnthropicRequest {
            model: self.config.chat_model.clone(),
            messages: anthropic_messages,
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
            stream,
            system,
            temperature: Some(options.temperature.unwrap_or(self.config.temperature)),
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<GenerationResponse> {
        debug!("Anthropic chat with {} messages", messages.len());

        let request = self.build_request(messages, options, false)?;
        let headers = self.headers();
        let borrowed: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response: AnthropicResponse = self
            .client
            .post_json(&self.messages_url(), &request, &borrowed, options.timeout)
            .await?;

        if response.content.is_empty() {
            return Err(LlmError::InvalidResponse("No content in response".to_string()).into());
        }

        let text = response
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let usage = TokenUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        };

        info!(
            "Generated {} tokens with {}",
            usage.input_tokens + usage.output_tokens,
            response.model
        );

        Ok(GenerationResponse {
            text,
            model: response.model,
            usage: Some(usage),
            finish_reason: response.stop_reason,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> Result<TextStream> {
        debug!("Anthropic streaming chat with {} messages", messages.len());

        let request = self.build_request(messages, options, true)?;
        let mut headers = self.headers();
        headers.push(("accept", "text/event-stream".to_string()));
        let borrowed: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response = self
            .client
            .post_stream(&self.messages_url(), &request, &borrowed)
            .await?;

        Ok(spawn_line_stream(response, cancel, |line| {
            // SSE framing: only `data:` lines carry payloads
            let Some(payload) = line.strip_prefix("data:") else {
                return LineEvent::Skip;
            };
            let payload = payload.trim();

            match serde_json::from_str::<StreamFrame>(payload) {
                Ok(frame) => match frame.frame_type.as_str() {
                    "content_block_delta" => match frame.delta.and_then(|d| d.text) {
                        Some(text) if !text.is_empty() => LineEvent::Delta(text),
                        _ => LineEvent::Skip,
                    },
                    "message_stop" => LineEvent::Done,
                    "error" => LineEvent::Fail(LlmError::GenerationFailed(
                        frame
                            .error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "stream error".to_string()),
                    )),
                    _ => LineEvent::Skip,
                },
                Err(e) => LineEvent::Fail(LlmError::InvalidResponse(e.to_string())),
            }
        }))
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1/models", self.config.base_url.trim_end_matches('/'));
        let headers = self.headers();
        let borrowed: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        match self.client.get::<ModelsResponse>(&url, &borrowed).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{system_message, user_message};

    fn test_config() -> LlmConfig {
        LlmConfig {
            provider: "anthropic".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key: Some("test-key".to_string()),
            chat_model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            timeout: 60,
        }
    }

    #[test]
    fn test_system_message_extraction() {
        let provider = AnthropicProvider::new(test_config());
        let messages = vec![
            system_message("You are an archivist"),
            user_message("Who rules Barovia?"),
        ];

        let request = provider
            .build_request(&messages, &ChatOptions::default(), false)
            .unwrap();
        assert_eq!(request.system.as_deref(), Some("You are an archivist"));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
    }

    #[test]
    fn test_empty_conversation_rejected() {
        let provider = AnthropicProvider::new(test_config());
        let messages = vec![system_message("system only")];
        assert!(provider
            .build_request(&messages, &ChatOptions::default(), false)
            .is_err());
    }

    #[test]
    fn test_stream_frame_parsing() {
        let frame: StreamFrame = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        assert_eq!(frame.frame_type, "content_block_delta");
        assert_eq!(frame.delta.unwrap().text.as_deref(), Some("Hi"));

        let stop: StreamFrame = serde_json::from_str(r#"{"type":"message_stop"}"#).unwrap();
        assert_eq!(stop.frame_type, "message_stop");
    }
}
