//! Batched vector generation against the embedding model API
//!
//! The embedding endpoint is a shared external service: callers bound their
//! concurrency at the worker level, and this client amortises request
//! overhead by batching inputs per call.

use crate::config::EmbeddingConfig;
use crate::error::{LlmError, LoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for the embedding model endpoint
pub struct EmbeddingClient {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        // Timeout is enforced per request below so cancellation can win
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Vector dimension this client is configured for
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Maximum inputs sent per request
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_url(&self) -> String {
        format!("{}/embed", self.config.base_url.trim_end_matches('/'))
    }

    /// Embed a single text
    pub async fn embed_one(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        let input = [text.to_string()];
        let mut vectors = self.request_batch(&input, cancel).await?;
        vectors
            .pop()
            .ok_or_else(|| LlmError::EmbeddingFailed("Empty embedding response".to_string()).into())
    }

    /// Embed a slice of texts, splitting into batches of at most
    /// [`batch_size`](Self::batch_size) inputs
    ///
    /// An empty input slice makes no HTTP call. `on_batch` is invoked after
    /// each completed batch with `(batches_done, batches_total)` so callers
    /// can report progress.
    pub async fn embed_all<F>(
        &self,
        inputs: &[String],
        cancel: &CancellationToken,
        mut on_batch: F,
    ) -> Result<Vec<Vec<f32>>>
    where
        F: FnMut(usize, usize),
    {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<&[String]> = inputs.chunks(self.config.batch_size).collect();
        let total = batches.len();
        let mut vectors = Vec::with_capacity(inputs.len());

        for (done, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(LoreError::Cancelled);
            }

            vectors.extend(self.request_batch(batch, cancel).await?);
            on_batch(done + 1, total);
        }

        Ok(vectors)
    }

    /// Issue one `POST {base}/embed` call
    ///
    /// Aborts on external cancellation or the per-request timeout, whichever
    /// fires first; both arms are released when the call returns.
    async fn request_batch(
        &self,
        batch: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding batch of {} inputs", batch.len());

        let request = EmbedRequest {
            model: &self.config.model,
            input: batch,
        };

        let send = self.client.post(self.embed_url()).json(&request).send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(LoreError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs(self.config.timeout)) => {
                return Err(LlmError::Timeout.into());
            }
            result = send => result.map_err(|e| LlmError::EmbeddingFailed(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {} error", status));
            error!("Embedding API error ({}): {}", status, error_text);
            return Err(LlmError::EmbeddingFailed(error_text).into());
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| LlmError::EmbeddingFailed(e.to_string()))?;

        if parsed.embeddings.len() != batch.len() {
            return Err(LlmError::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                parsed.embeddings.len()
            ))
            .into());
        }

        for vector in &parsed.embeddings {
            if vector.len() != self.config.dimension {
                return Err(LlmError::EmbeddingFailed(format!(
                    "Expected dimension {}, got {}",
                    self.config.dimension,
                    vector.len()
                ))
                .into());
            }
        }

        Ok(parsed.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: &str) -> EmbeddingClient {
        EmbeddingClient::new(EmbeddingConfig {
            base_url: base_url.to_string(),
            model: "test-embed".to_string(),
            dimension: 4,
            batch_size: 2,
            timeout: 5,
        })
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_call() {
        // Unroutable base URL: any HTTP attempt would fail loudly
        let client = test_client("http://127.0.0.1:1");
        let cancel = CancellationToken::new();

        let vectors = client.embed_all(&[], &cancel, |_, _| {}).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() {
        let client = test_client("http://127.0.0.1:1");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client
            .embed_all(&["text".to_string()], &cancel, |_, _| {})
            .await;
        assert!(matches!(result, Err(LoreError::Cancelled)));
    }

    #[test]
    fn test_embed_url() {
        let client = test_client("http://localhost:8081/");
        assert_eq!(client.embed_url(), "http://localhost:8081/embed");
    }
}
