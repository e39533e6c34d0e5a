//! Configuration validation.
//!
//! Catches values that would only fail later, mid-conversation: malformed
//! backend URLs, zero budgets, unknown provider tags.

use thiserror::Error;

use crate::config::{AiConfig, Config, ContextSettings, ObservabilityConfig, ProviderKind};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

fn check_url(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        Ok(parsed) => errors.push(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        }),
        Err(e) => errors.push(ValidationError::InvalidValue {
            field: field.into(),
            reason: e.to_string(),
        }),
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.ai.validate() {
            errors.push(e);
        }
        if let Err(e) = self.context.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        collect(errors)
    }
}

impl Validate for AiConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.default_model.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "ai.default_model".into(),
            });
        }
        if self.hosted.enabled {
            check_url("ai.hosted.base_url", &self.hosted.base_url, &mut errors);
        }
        if self.ollama.enabled {
            check_url("ai.ollama.base_url", &self.ollama.base_url, &mut errors);
        }
        if self.connect_timeout_secs == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "ai.connect_timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        for (idx, model) in self.custom_models.iter().enumerate() {
            if model.name.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("ai.custom_models[{idx}].name"),
                });
            }
            if let Err(e) = model.provider.parse::<ProviderKind>() {
                errors.push(ValidationError::InvalidValue {
                    field: format!("ai.custom_models[{idx}].provider"),
                    reason: e.to_string(),
                });
            }
            if model.max_tokens == 0 {
                errors.push(ValidationError::InvalidValue {
                    field: format!("ai.custom_models[{idx}].max_tokens"),
                    reason: "must be greater than 0".into(),
                });
            }
        }

        collect(errors)
    }
}

impl Validate for ContextSettings {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.max_context_length == Some(0) {
            errors.push(ValidationError::InvalidValue {
                field: "context.max_context_length".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if !(self.chars_per_token.is_finite() && self.chars_per_token > 0.0) {
            errors.push(ValidationError::InvalidValue {
                field: "context.chars_per_token".into(),
                reason: "must be a positive number".into(),
            });
        }
        if let Some(model) = &self.summary_model {
            if model.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: "context.summary_model".into(),
                });
            }
        }

        collect(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("expected 'json' or 'pretty', got '{}'", self.log_format),
            });
        }
        Ok(())
    }
}
