//! Per-session context configuration.

use notewise_ai::models::{ModelRegistry, ProviderKind, SizingPolicy, DEFAULT_CONTEXT_LENGTH};
use notewise_common::config::{AiConfig, ContextSettings};
use serde::{Deserialize, Serialize};

/// Settings a [`ContextManager`](crate::ContextManager) runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// When false, transcripts pass through untouched
    pub enabled: bool,
    /// Compaction threshold in characters
    pub max_context_length: usize,
    /// Model used for summarization calls
    pub summary_model: String,
}

impl ContextConfig {
    /// Enabled configuration with an explicit threshold.
    pub fn new(max_context_length: usize, summary_model: impl Into<String>) -> Self {
        Self {
            enabled: true,
            max_context_length,
            summary_model: summary_model.into(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Derive the configuration for the configured conversation model.
    ///
    /// An explicit `context.max_context_length` wins over the threshold
    /// recommended for the model's window.
    pub fn resolve(ai: &AiConfig, settings: &ContextSettings, registry: &ModelRegistry) -> Self {
        let tokens = match ai.default_provider.parse::<ProviderKind>() {
            Ok(kind) => registry.context_length(&ai.default_model, kind),
            Err(_) => {
                tracing::debug!(
                    provider = %ai.default_provider,
                    "Provider has no model table, assuming default window"
                );
                DEFAULT_CONTEXT_LENGTH
            }
        };

        let policy = SizingPolicy::with_chars_per_token(settings.chars_per_token);
        let max_context_length = settings
            .max_context_length
            .unwrap_or_else(|| policy.recommend(tokens).max_context_length);
        let summary_model = settings
            .summary_model
            .clone()
            .unwrap_or_else(|| ai.default_model.clone());

        Self {
            enabled: settings.enabled,
            max_context_length,
            summary_model,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::resolve(
            &AiConfig::default(),
            &ContextSettings::default(),
            &ModelRegistry::builtin(),
        )
    }
}
