//! Notewise Common - Shared types, utilities, and configuration for Notewise.
//!
//! This crate provides:
//! - Configuration types, loading, and environment overrides
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup
//! - Character-safe string helpers used by the context manager and providers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    AiConfig, Config, ContextSettings, CustomModelConfig, HostedConfig, ObservabilityConfig,
    OllamaConfig, StorageConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
