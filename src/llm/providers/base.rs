//! Shared HTTP plumbing for LLM providers

use crate::error::{LlmError, Result};
use crate::llm::TextStream;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What a provider makes of one line of a streaming response body
pub enum LineEvent {
    /// A text delta to forward to the consumer
    Delta(String),
    /// A framing line with no payload
    Skip,
    /// The provider signalled end-of-stream
    Done,
    /// The provider reported an error mid-stream
    Fail(LlmError),
}

/// HTTP client shared by the providers
pub struct HttpProviderClient {
    client: Client,
    timeout: Duration,
}

impl HttpProviderClient {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Execute a POST request with JSON body and deserialize the response
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
        timeout_override: Option<u64>,
    ) -> Result<R> {
        debug!("Making POST request to: {}", url);

        let mut request = self.client.post(url).json(body);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let timeout = timeout_override
            .map(Duration::from_secs)
            .unwrap_or(self.timeout);

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        Self::deserialize_response(response).await
    }

    /// Execute a GET request and deserialize the response
    pub async fn get<R: DeserializeOwned>(&self, url: &str, headers: &[(&str, &str)]) -> Result<R> {
        debug!("Making GET request to: {}", url);

        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        Self::deserialize_response(response).await
    }

    /// Execute a POST request and hand back the raw response for streaming
    ///
    /// The timeout only covers connection and response headers; the body is
    /// consumed incrementally by the caller.
    pub async fn post_stream<T: Serialize>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        debug!("Opening streaming POST to: {}", url);

        // The client-level timeout would cut long streams short, so the
        // streaming path builds its request on a timeout-free client.
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        let mut request = client.post(url).json(body);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {} error", status));
            error!("Streaming API error ({}): {}", status, error_text);
            return Err(Self::status_error(status.as_u16(), error_text).into());
        }

        Ok(response)
    }

    async fn deserialize_response<R: DeserializeOwned>(response: Response) -> Result<R> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {} error", status));
            error!("API error ({}): {}", status, error_text);
            return Err(Self::status_error(status.as_u16(), error_text).into());
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()).into())
    }

    fn status_error(status: u16, error_text: String) -> LlmError {
        match status {
            401 => LlmError::Unauthorized,
            429 => LlmError::RateLimited,
            500..=599 => LlmError::ServerError(error_text),
            _ => LlmError::GenerationFailed(error_text),
        }
    }
}

/// Turn a line-oriented response body into a [`TextStream`]
///
/// The reader task splits the body on newlines and feeds each line through
/// `parse_line`. Cancelling the token, or dropping the returned stream,
/// stops the task and aborts the underlying request.
pub fn spawn_line_stream<F>(
    response: Response,
    cancel: CancellationToken,
    mut parse_line: F,
) -> TextStream
where
    F: FnMut(&str) -> LineEvent + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<String>>(32);

    tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut buffer = String::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Stream cancelled by caller");
                    return;
                }
                next = body.next() => next,
            };

            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    warn!("Stream transport error: {}", e);
                    let _ = tx
                        .send(Err(LlmError::ConnectionFailed(e.to_string()).into()))
                        .await;
                    return;
                }
                None => break,
            };

            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match parse_line(line) {
                    LineEvent::Delta(text) => {
                        if tx.send(Ok(text)).await.is_err() {
                            // Consumer dropped the stream
                            return;
                        }
                    }
                    LineEvent::Skip => {}
                    LineEvent::Done => return,
                    LineEvent::Fail(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                }
            }
        }

        // Trailing line without a newline terminator
        let line = buffer.trim();
        if !line.is_empty() {
            match parse_line(line) {
                LineEvent::Delta(text) => {
                    let _ = tx.send(Ok(text)).await;
                }
                LineEvent::Fail(e) => {
                    let _ = tx.send(Err(e.into())).await;
                }
                LineEvent::Skip | LineEvent::Done => {}
            }
        }
    });

    Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            HttpProviderClient::status_error(401, String::new()),
            LlmError::Unauthorized
        ));
        assert!(matches!(
            HttpProviderClient::status_error(429, String::new()),
            LlmError::RateLimited
        ));
        assert!(matches!(
            HttpProviderClient::status_error(503, String::new()),
            LlmError::ServerError(_)
        ));
        assert!(matches!(
            HttpProviderClient::status_error(400, String::new()),
            LlmError::GenerationFailed(_)
        ));
    }
}
