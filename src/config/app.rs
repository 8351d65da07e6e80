//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, expand_env_vars};

/// Default connection-open timeout for the networked backend.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Dual-backend database configuration.
///
/// The networked backend is described either by the discrete fields or by a
/// full `url` descriptor (which wins when present). The embedded fallback
/// only needs a file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Networked backend host.
    pub host: String,

    /// Networked backend database name.
    pub name: String,

    /// Networked backend user.
    pub user: String,

    /// Networked backend password.
    pub password: String,

    /// Networked backend port (default: 5432).
    pub port: u16,

    /// Full URL-style connection descriptor; overrides the discrete fields.
    pub url: Option<String>,

    /// Embedded fallback database file path.
    pub sqlite_path: String,

    /// Connection-open timeout for the networked backend (default: "10s").
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            name: "predictions".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            port: 5432,
            url: None,
            sqlite_path: "predictions.db".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// =============================================================================
// Model Configuration
// =============================================================================

/// Classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the JSON weights file.
    pub path: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/model.json".to_string(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server configuration.
    pub server: ServerConfig,

    /// Database configuration.
    pub database: DatabaseConfig,

    /// Model configuration.
    pub model: ModelConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references in the file are expanded
    /// from the environment before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&expand_env_vars(&content))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.sqlite_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "database sqlite_path must not be empty".to_string(),
            ));
        }

        if self.database.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "database connect_timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.name, "predictions");
        assert_eq!(config.port, 5432);
        assert_eq!(config.url, None);
        assert_eq!(config.sqlite_path, "predictions.db");
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = AppConfig {
            server: ServerConfig {
                bind: "127.0.0.1".to_string(),
                port: 8080,
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let config = AppConfig {
            server: ServerConfig {
                bind: "0.0.0.0".to_string(),
                port: 0,
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_bind_address() {
        let config = AppConfig {
            server: ServerConfig {
                bind: "not-an-ip".to_string(),
                port: 8080,
            },
            ..AppConfig::default()
        };
        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("invalid server bind address")
        );
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "server:\n  bind: \"127.0.0.1\"\n  port: 9090\n\
             database:\n  host: \"db.internal\"\n  connect_timeout: \"2s\"\n\
             model:\n  path: \"weights.json\"\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.model.path, "weights.json");
        // Unspecified fields keep their defaults.
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default("/definitely/not/here.yaml").unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_expands_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "database:\n  password: \"${GENEPREDICT_TEST_PW:-fallback_pw}\"\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.database.password, "fallback_pw");
    }
}
