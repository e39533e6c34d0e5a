//! Model registry and context sizing policy.
//!
//! Token counts are never measured exactly. A fixed chars-per-token ratio
//! converts a model's context window into a character budget for the
//! context manager.

use notewise_common::config::CustomModelConfig;
pub use notewise_common::config::{ProviderKind, UnknownProvider};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Context window assumed for models missing from the registry.
pub const DEFAULT_CONTEXT_LENGTH: u64 = 4096;

// ============================================================================
// Model Registry
// ============================================================================

/// A model and its context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub provider: ProviderKind,
    /// Context window in tokens
    pub context_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

const BUILTIN_MODELS: &[(&str, ProviderKind, u64, &str)] = &[
    ("Claude-Sonnet-4.5", ProviderKind::Poe, 200_000, "Claude Sonnet 4.5, balanced quality and speed"),
    ("GPT-5-Chat", ProviderKind::Poe, 400_000, "GPT-5 chat model"),
    ("Claude-3-Sonnet", ProviderKind::Poe, 200_000, "Claude 3 Sonnet"),
    ("GPT-4o", ProviderKind::Poe, 128_000, "GPT-4o multimodal model"),
    ("Claude-3.5-Sonnet", ProviderKind::Poe, 200_000, "Claude 3.5 Sonnet"),
    ("GPT-4-Turbo", ProviderKind::Poe, 128_000, "GPT-4 Turbo"),
    ("llama2", ProviderKind::Ollama, 4_096, "Llama 2 (local)"),
    ("mistral", ProviderKind::Ollama, 8_192, "Mistral 7B (local)"),
    ("deepseek-r1:8b", ProviderKind::Ollama, 32_768, "DeepSeek R1 8B reasoning model (local)"),
    ("qwen2.5:7b", ProviderKind::Ollama, 32_768, "Qwen 2.5 7B (local)"),
    ("llama3.1:8b", ProviderKind::Ollama, 128_000, "Llama 3.1 8B (local)"),
];

/// Lookup table of known models.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelInfo>,
}

impl ModelRegistry {
    /// Registry holding only the built-in models.
    pub fn builtin() -> Self {
        let models = BUILTIN_MODELS
            .iter()
            .map(|(name, provider, context_length, description)| ModelInfo {
                name: (*name).to_string(),
                provider: *provider,
                context_length: *context_length,
                description: Some((*description).to_string()),
            })
            .collect();
        Self { models }
    }

    /// Add user-defined models. Entries with an unknown provider tag are skipped.
    pub fn with_custom_models(mut self, custom: &[CustomModelConfig]) -> Self {
        for model in custom {
            match model.provider.parse::<ProviderKind>() {
                Ok(provider) => self.register(ModelInfo {
                    name: model.name.clone(),
                    provider,
                    context_length: model.max_tokens,
                    description: None,
                }),
                Err(e) => tracing::warn!(model = %model.name, error = %e, "Skipping custom model"),
            }
        }
        self
    }

    /// Add a model, replacing any entry with the same name and provider.
    pub fn register(&mut self, info: ModelInfo) {
        match self
            .models
            .iter_mut()
            .find(|m| m.name == info.name && m.provider == info.provider)
        {
            Some(existing) => *existing = info,
            None => self.models.push(info),
        }
    }

    pub fn get(&self, name: &str, provider: ProviderKind) -> Option<&ModelInfo> {
        self.models
            .iter()
            .find(|m| m.name == name && m.provider == provider)
    }

    /// Context window of a model in tokens, [`DEFAULT_CONTEXT_LENGTH`] if unknown.
    pub fn context_length(&self, name: &str, provider: ProviderKind) -> u64 {
        self.get(name, provider)
            .map_or(DEFAULT_CONTEXT_LENGTH, |m| m.context_length)
    }

    pub fn all(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn by_provider(&self, provider: ProviderKind) -> impl Iterator<Item = &ModelInfo> + '_ {
        self.models.iter().filter(move |m| m.provider == provider)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_registry() -> &'static ModelRegistry {
    static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ModelRegistry::builtin)
}

// ============================================================================
// Sizing Policy
// ============================================================================

/// Character budgets derived from a model's context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecommendedContext {
    /// Compaction threshold in characters
    pub max_context_length: usize,
    /// Advisory size of the raw tail kept for the editor
    pub recent_text_length: usize,
}

/// Tunable chars/token heuristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingPolicy {
    /// Characters per token; 0.5 suits CJK-heavy text
    pub chars_per_token: f64,
    /// Share of the window usable for context
    pub context_share: f64,
    /// Share of the budget kept as recent text
    pub recent_share: f64,
    pub recent_min: usize,
    pub recent_max: usize,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            chars_per_token: 0.5,
            context_share: 0.6,
            recent_share: 0.03,
            recent_min: 5_000,
            recent_max: 20_000,
        }
    }
}

impl SizingPolicy {
    /// Default policy with a different chars/token ratio.
    pub fn with_chars_per_token(chars_per_token: f64) -> Self {
        Self {
            chars_per_token,
            ..Self::default()
        }
    }

    pub fn tokens_to_chars(&self, tokens: u64) -> u64 {
        (tokens as f64 * self.chars_per_token).floor() as u64
    }

    pub fn chars_to_tokens(&self, chars: u64) -> u64 {
        (chars as f64 / self.chars_per_token).ceil() as u64
    }

    /// Budgets for a model with a `tokens`-sized window.
    pub fn recommend(&self, tokens: u64) -> RecommendedContext {
        let chars = self.tokens_to_chars(tokens);
        let max_context_length = (chars as f64 * self.context_share).floor() as usize;
        let recent = (max_context_length as f64 * self.recent_share).floor() as usize;
        RecommendedContext {
            max_context_length,
            recent_text_length: recent.min(self.recent_max).max(self.recent_min),
        }
    }
}

// ============================================================================
// Free Functions
// ============================================================================

/// Context window of a built-in model, 4096 if unknown.
pub fn get_model_context_length(name: &str, provider: ProviderKind) -> u64 {
    builtin_registry().context_length(name, provider)
}

pub fn tokens_to_chars(tokens: u64) -> u64 {
    SizingPolicy::default().tokens_to_chars(tokens)
}

pub fn chars_to_tokens(chars: u64) -> u64 {
    SizingPolicy::default().chars_to_tokens(chars)
}

/// Default budgets for a built-in model.
pub fn get_recommended_context_length(name: &str, provider: ProviderKind) -> RecommendedContext {
    SizingPolicy::default().recommend(get_model_context_length(name, provider))
}
