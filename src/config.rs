//! Configuration module for the GenePredict application.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (networked backend fields/URL, embedded fallback path)
//! - Model settings (weights file path)

mod app;
mod validation;

pub use app::{AppConfig, DatabaseConfig, DEFAULT_CONNECT_TIMEOUT, ModelConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars};
