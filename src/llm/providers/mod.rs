//! LLM provider implementations

pub mod anthropic;
pub mod base;
pub mod local;

pub use anthropic::AnthropicProvider;
pub use local::LocalProvider;

use crate::config::LlmConfig;
use crate::error::{LoreError, Result};
use crate::llm::LlmProvider;
use std::sync::Arc;

/// Construct the provider selected by configuration
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalProvider::new(config.clone()))),
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config.clone()))),
        other => Err(LoreError::Config(format!("Unknown LLM provider: {}", other))),
    }
}
