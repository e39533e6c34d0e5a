//! Streaming AI provider abstraction.
//!
//! A provider turns (prompt, context, model) into incrementally delivered
//! text fragments, honouring a cooperative cancellation token:
//! - [`HostedProvider`] - bearer-authenticated chat-completions endpoint (SSE)
//! - [`OllamaProvider`] - local Ollama `/api/generate` endpoint (NDJSON)

mod hosted;
mod ollama;

pub use hosted::HostedProvider;
pub use ollama::OllamaProvider;

use async_trait::async_trait;
use notewise_common::util::{sanitize_for_log, truncate_with_ellipsis};
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::AiError;

/// Default TCP connect timeout for provider clients.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest backend error body kept in [`AiError::Backend`], in characters.
const MAX_ERROR_BODY_CHARS: usize = 4096;

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for streaming LLM backends.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider name used for routing.
    fn name(&self) -> &str;

    /// Stream a completion for `prompt`, with `context` placed before it.
    ///
    /// `on_chunk` receives fragments in arrival order. A call whose `cancel`
    /// token fires returns `Ok(())` and delivers nothing further.
    async fn send_prompt(
        &self,
        prompt: &str,
        context: &str,
        model: &str,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
        cancel: &CancellationToken,
    ) -> Result<(), AiError>;
}

/// Build an HTTP client with the given timeouts.
///
/// No overall timeout is applied unless one is given: streams can run long.
pub(crate) fn build_client(connect_timeout: Duration, request_timeout: Option<Duration>) -> Client {
    let mut builder = Client::builder().connect_timeout(connect_timeout);
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap_or_else(|_| Client::new())
}

/// Await `request`, giving up early if `cancel` fires.
///
/// Returns `None` when cancelled.
pub(crate) async fn send_cancellable(
    provider: &str,
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<Option<reqwest::Response>, AiError> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(None),
        result = request.send() => result.map_err(|e| AiError::transport(provider, e))?,
    };

    let status = response.status();
    if !status.is_success() {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            body = response.text() => body.unwrap_or_default(),
        };
        tracing::warn!(
            provider,
            status = status.as_u16(),
            body = %sanitize_for_log(&body),
            "Backend rejected request"
        );
        return Err(AiError::Backend {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: truncate_with_ellipsis(&body, MAX_ERROR_BODY_CHARS),
        });
    }

    if response.content_length() == Some(0) {
        return Err(AiError::EmptyResponse {
            provider: provider.to_string(),
        });
    }

    Ok(Some(response))
}
