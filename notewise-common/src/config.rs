//! Configuration types for Notewise.
//!
//! Configuration lives in `~/.notewise/`:
//! - `config.json` - Core configuration
//! - `secrets.json` - Credentials, merged over `config.json`
//!
//! Environment variables are applied last.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::config_loader::load_modular_config;
use crate::error::{Result, ResultExt};
use crate::validation::Validate;

/// Get the configuration directory (~/.notewise).
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".notewise"),
        |dirs| dirs.home_dir().join(".notewise"),
    )
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// AI provider configuration
    #[serde(default)]
    pub ai: AiConfig,

    /// Context management configuration
    #[serde(default)]
    pub context: ContextSettings,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default directory.
    pub fn load() -> Result<Self> {
        Self::load_from_dir(&config_dir())
    }

    /// Load configuration from a specific directory (`config.json` + `secrets.json`).
    ///
    /// Missing files yield defaults.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let value = load_modular_config(dir)?;
        let config: Self = serde_json::from_value(value)
            .context(format!("Failed to parse config in {}", dir.display()))?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides, then validate it.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("POE_API_KEY") {
            self.ai.hosted.api_key = Some(key);
        }
        if let Some(url) = lookup("NOTEWISE_POE_BASE_URL") {
            self.ai.hosted.base_url = url;
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.ai.ollama.base_url = url;
        }
        if let Some(provider) = lookup("NOTEWISE_DEFAULT_PROVIDER") {
            self.ai.default_provider = provider;
        }
        if let Some(model) = lookup("NOTEWISE_DEFAULT_MODEL") {
            self.ai.default_model = model;
        }
        if let Some(level) = lookup("NOTEWISE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(path) = lookup("NOTEWISE_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }
}

// ============================================================================
// AI Providers
// ============================================================================

/// AI provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Provider used for conversation calls ("poe" or "ollama")
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used for conversation calls
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Hosted chat-completions backend
    #[serde(default)]
    pub hosted: HostedConfig,

    /// Local Ollama backend
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// User-defined models and their context windows
    #[serde(default)]
    pub custom_models: Vec<CustomModelConfig>,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Overall request timeout in seconds. Unset means streams may run indefinitely.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            hosted: HostedConfig::default(),
            ollama: OllamaConfig::default(),
            custom_models: vec![],
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: None,
        }
    }
}

fn default_provider() -> String {
    "poe".into()
}

fn default_model() -> String {
    "Claude-Sonnet-4.5".into()
}

fn default_connect_timeout() -> u64 {
    10
}

/// Hosted (bearer-authenticated, chat-completions) backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedConfig {
    /// Whether to register the hosted provider
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Provider name used for routing
    #[serde(default = "default_hosted_name")]
    pub name: String,

    /// API key (usually kept in secrets.json)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL; `/chat/completions` is appended
    #[serde(default = "default_hosted_url")]
    pub base_url: String,
}

impl Default for HostedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_hosted_name(),
            api_key: None,
            base_url: default_hosted_url(),
        }
    }
}

fn default_hosted_name() -> String {
    "poe".into()
}

fn default_hosted_url() -> String {
    "https://api.poe.com/v1".into()
}

/// Ollama (local models) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Whether to register the Ollama provider
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ollama API base URL
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_ollama_url(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}

/// Backend family a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Poe,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poe => "poe",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Unrecognised provider tag.
#[derive(Debug, Error)]
#[error("unknown provider '{0}', expected 'poe' or 'ollama'")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poe" => Ok(Self::Poe),
            "ollama" => Ok(Self::Ollama),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// A user-defined model entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModelConfig {
    /// Model identifier as sent to the backend
    pub name: String,
    /// Provider tag, parsed as a [`ProviderKind`]
    pub provider: String,
    /// Context window in tokens
    pub max_tokens: u64,
}

// ============================================================================
// Context Management
// ============================================================================

/// Context management settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Master switch for summarization-based context management
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Character threshold; derived from the model window when unset
    #[serde(default)]
    pub max_context_length: Option<usize>,

    /// Model used for summarization; the default model when unset
    #[serde(default)]
    pub summary_model: Option<String>,

    /// Characters per token used by the sizing heuristic
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_context_length: None,
            summary_model: None,
            chars_per_token: default_chars_per_token(),
        }
    }
}

fn default_chars_per_token() -> f64 {
    0.5
}

// ============================================================================
// Observability & Storage
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding persisted summaries
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved database path (`~/.notewise/notewise.db` by default).
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir().join("notewise.db"))
    }
}

fn default_true() -> bool {
    true
}
