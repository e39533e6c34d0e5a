//! Hosted chat-completions provider.
//!
//! Speaks the OpenAI-compatible streaming protocol. The default endpoint is
//! Poe's; any compatible base URL can be configured.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{build_client, send_cancellable, AiProvider, DEFAULT_CONNECT_TIMEOUT};
use crate::error::AiError;
use crate::stream::{drive_lines, parse_sse_line, LineControl, SseFrame};

const DEFAULT_BASE_URL: &str = "https://api.poe.com/v1";
const DEFAULT_NAME: &str = "poe";

/// Bearer-authenticated chat-completions provider.
pub struct HostedProvider {
    name: String,
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

impl HostedProvider {
    /// Create a provider for the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: build_client(DEFAULT_CONNECT_TIMEOUT, None),
        }
    }

    /// Point the provider at another compatible endpoint.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Register under a different routing name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rebuild the HTTP client with explicit timeouts.
    pub fn with_timeouts(mut self, connect: Duration, request: Option<Duration>) -> Self {
        self.client = build_client(connect, request);
        self
    }

    fn build_messages<'a>(prompt: &'a str, context: &str) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(2);
        if !context.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: format!("Context: {context}").into(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.into(),
        });
        messages
    }
}

#[async_trait]
impl AiProvider for HostedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_prompt(
        &self,
        prompt: &str,
        context: &str,
        model: &str,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
        cancel: &CancellationToken,
    ) -> Result<(), AiError> {
        let body = ChatCompletionRequest {
            model,
            messages: Self::build_messages(prompt, context),
            stream: true,
        };
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            provider = %self.name,
            model,
            prompt_len = prompt.len(),
            context_len = context.len(),
            "Sending chat completion request"
        );

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);

        let Some(response) = send_cancellable(&self.name, request, cancel).await? else {
            tracing::debug!(provider = %self.name, "Cancelled before response");
            return Ok(());
        };

        let name = self.name.as_str();
        let end = drive_lines(response.bytes_stream(), cancel, |line| {
            match parse_sse_line(line) {
                Ok(SseFrame::Delta(text)) => {
                    on_chunk(&text);
                    LineControl::Continue
                }
                Ok(SseFrame::Done) => LineControl::Stop,
                Ok(SseFrame::Ignored) => LineControl::Continue,
                Err(e) => {
                    tracing::warn!(provider = name, error = %e, "Skipping malformed stream frame");
                    LineControl::Continue
                }
            }
        })
        .await
        .map_err(|e| AiError::transport(name, e))?;

        tracing::debug!(provider = name, ?end, "Stream ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse_body(frames: &[&str]) -> String {
        frames.iter().map(|f| format!("{f}\n\n")).collect()
    }

    async fn collect(
        provider: &HostedProvider,
        context: &str,
        cancel: &CancellationToken,
    ) -> (Result<(), AiError>, Vec<String>) {
        let mut chunks = Vec::new();
        let result = provider
            .send_prompt("What is Rust?", context, "GPT-4o", &mut |c: &str| chunks.push(c.to_string()), cancel)
            .await;
        (result, chunks)
    }

    #[test]
    fn test_builder_defaults() {
        let provider = HostedProvider::new("k")
            .with_base_url("https://example.test/v1/")
            .with_name("compatible");
        assert_eq!(provider.name(), "compatible");
        assert_eq!(provider.base_url, "https://example.test/v1");
        assert_eq!(HostedProvider::new("k").name(), "poe");
    }

    #[test]
    fn test_context_becomes_system_message() {
        let messages = HostedProvider::build_messages("question", "notes");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "Context: notes");
        assert_eq!(messages[1].role, "user");

        let bare = HostedProvider::build_messages("question", "");
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].content, "question");
    }

    #[tokio::test]
    async fn test_streams_chunks_in_order_and_skips_malformed() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {not json"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            "data: [DONE]",
            r#"data: {"choices":[{"delta":{"content":"ignored"}}]}"#,
        ]);

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "GPT-4o",
                "stream": true,
                "messages": [
                    {"role": "system", "content": "Context: earlier notes"},
                    {"role": "user", "content": "What is Rust?"}
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = HostedProvider::new("test-key").with_base_url(&server.uri());
        let (result, chunks) = collect(&provider, "earlier notes", &CancellationToken::new()).await;

        assert!(result.is_ok());
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let provider = HostedProvider::new("bad").with_base_url(&server.uri());
        let (result, chunks) = collect(&provider, "", &CancellationToken::new()).await;

        match result {
            Err(AiError::Backend { provider, status, body }) => {
                assert_eq!(provider, "poe");
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_body_is_kept_verbatim() {
        let body = r#"{"error":{"code":"max_tokens_exceeded_for_model","message":"Bearer authentication_failed_for_key"}}"#;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(body))
            .mount(&server)
            .await;

        let provider = HostedProvider::new("k").with_base_url(&server.uri());
        let (result, _) = collect(&provider, "", &CancellationToken::new()).await;

        match result {
            Err(AiError::Backend { status, body: got, .. }) => {
                assert_eq!(status, 400);
                assert_eq!(got, body);
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_while_reading_error_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Status arrives at once, the promised body never completes
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 1000\r\n\r\npartial")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let provider = HostedProvider::new("k").with_base_url(&format!("http://{addr}"));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let (result, chunks) = collect(&provider, "", &cancel).await;
        assert!(result.is_ok());
        assert!(chunks.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let provider = HostedProvider::new("k").with_base_url(&server.uri());
        let (result, _) = collect(&provider, "", &CancellationToken::new()).await;
        assert!(matches!(result, Err(AiError::EmptyResponse { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_call_returns_ok_without_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse_body(&[r#"data: {"choices":[{"delta":{"content":"x"}}]}"#]))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let provider = HostedProvider::new("k").with_base_url(&server.uri());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let (result, chunks) = collect(&provider, "", &cancel).await;
        assert!(result.is_ok());
        assert!(chunks.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let provider = HostedProvider::new("k")
            .with_base_url("http://127.0.0.1:9")
            .with_timeouts(Duration::from_millis(500), None);
        let (result, _) = collect(&provider, "", &CancellationToken::new()).await;
        assert!(matches!(result, Err(AiError::Transport { .. })));
    }
}
