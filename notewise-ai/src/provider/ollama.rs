//! Ollama provider.
//!
//! Connects to a local Ollama instance through `/api/generate`, which takes a
//! single prompt string and streams one JSON object per line.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{build_client, send_cancellable, AiProvider, DEFAULT_CONNECT_TIMEOUT};
use crate::error::AiError;
use crate::stream::{drive_lines, parse_ndjson_line, LineControl};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama provider for local models.
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

impl OllamaProvider {
    /// Create a new Ollama provider.
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (defaults to http://localhost:11434)
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: build_client(DEFAULT_CONNECT_TIMEOUT, None),
        }
    }

    /// Rebuild the HTTP client with explicit timeouts.
    pub fn with_timeouts(mut self, connect: Duration, request: Option<Duration>) -> Self {
        self.client = build_client(connect, request);
        self
    }

    fn build_prompt(prompt: &str, context: &str) -> String {
        if context.is_empty() {
            prompt.to_string()
        } else {
            format!("Context: {context}\n\n{prompt}")
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send_prompt(
        &self,
        prompt: &str,
        context: &str,
        model: &str,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
        cancel: &CancellationToken,
    ) -> Result<(), AiError> {
        let body = GenerateRequest {
            model,
            prompt: Self::build_prompt(prompt, context),
            stream: true,
        };
        let url = format!("{}/api/generate", self.base_url);

        tracing::debug!(
            provider = "ollama",
            model,
            prompt_len = body.prompt.len(),
            "Sending generate request"
        );

        let request = self.client.post(&url).json(&body);
        let Some(response) = send_cancellable("ollama", request, cancel).await? else {
            tracing::debug!(provider = "ollama", "Cancelled before response");
            return Ok(());
        };

        let end = drive_lines(response.bytes_stream(), cancel, |line| {
            match parse_ndjson_line(line) {
                Ok(Some(frame)) => {
                    if !frame.response.is_empty() {
                        on_chunk(&frame.response);
                    }
                    if frame.done {
                        LineControl::Stop
                    } else {
                        LineControl::Continue
                    }
                }
                Ok(None) => LineControl::Continue,
                Err(e) => {
                    tracing::warn!(provider = "ollama", error = %e, "Skipping malformed stream frame");
                    LineControl::Continue
                }
            }
        })
        .await
        .map_err(|e| AiError::transport("ollama", e))?;

        tracing::debug!(provider = "ollama", ?end, "Stream ended");
        Ok(())
    }
}
