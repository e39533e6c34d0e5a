//! Errors surfaced by AI providers and the routing service.
//!
//! Cancellation is deliberately absent: a cancelled call completes with `Ok(())`.

use thiserror::Error;

/// Error from an AI call.
#[derive(Debug, Error)]
pub enum AiError {
    /// No provider registered under the requested name.
    #[error("Provider {0} not found")]
    ProviderNotFound(String),

    /// The backend answered with a non-success status.
    #[error("[{provider}] API error ({status}): {body}")]
    Backend {
        provider: String,
        status: u16,
        body: String,
    },

    /// The backend answered successfully but sent no body to stream.
    #[error("[{provider}] Response body is empty")]
    EmptyResponse { provider: String },

    /// Connection or stream-level failure.
    #[error("[{provider}] Request failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
}

impl AiError {
    pub(crate) fn transport(provider: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            provider: provider.to_string(),
            source,
        }
    }

    /// HTTP status of a backend rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }
}
