//! Notewise AI - streaming provider abstraction and model sizing.
//!
//! This crate provides:
//! - The [`AiProvider`] trait with hosted (SSE) and Ollama (NDJSON) backends
//! - [`AiService`], which routes prompts by provider name and owns the
//!   current-generation cancellation handle
//! - The model registry and the chars-per-token sizing heuristic

pub mod error;
pub mod models;
pub mod provider;
pub mod service;
pub mod stream;

pub use error::AiError;
pub use models::{
    chars_to_tokens, get_model_context_length, get_recommended_context_length, tokens_to_chars,
    ModelInfo, ModelRegistry, ProviderKind, RecommendedContext, SizingPolicy,
    DEFAULT_CONTEXT_LENGTH,
};
pub use provider::{AiProvider, HostedProvider, OllamaProvider};
pub use service::AiService;

// Re-exported so callers can build cancellation handles without a direct dependency
pub use tokio_util::sync::CancellationToken;
