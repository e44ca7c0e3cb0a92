//! Configuration loading from files and strings.
//!
//! Supports YAML, TOML, and JSON sources with `${ENV_VAR}` substitution,
//! selected by file extension. Loading validates the result; a gateway
//! never starts on an invalid configuration.

use crate::schema::GatewayConfig;
use gateway_core::GatewayError;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// IO error
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported file extension
    #[error("Unsupported configuration format: {extension}")]
    UnsupportedFormat {
        /// The unrecognized file extension
        extension: String,
    },

    /// Referenced environment variable is not set
    #[error("Environment variable not found: {name}")]
    EnvVarNotFound {
        /// The missing variable name
        name: String,
    },

    /// Configuration failed validation
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for GatewayError {
    fn from(err: ConfigError) -> Self {
        GatewayError::configuration(err.to_string())
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a file, dispatching on extension
    ///
    /// # Errors
    /// Returns `ConfigError` on missing files, parse failures, unset
    /// environment variables, or validation failures
    pub async fn from_file(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let raw = fs::read_to_string(path).await?;
        debug!(path = %path.display(), bytes = raw.len(), "Read configuration file");

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let config = match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&raw)?,
            "toml" => Self::from_toml_str(&raw)?,
            "json" => Self::from_json_str(&raw)?,
            other => {
                return Err(ConfigError::UnsupportedFormat {
                    extension: other.to_string(),
                })
            }
        };

        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    ///
    /// # Errors
    /// Returns `ConfigError` on parse, substitution, or validation failures
    pub fn from_yaml_str(raw: &str) -> Result<GatewayConfig, ConfigError> {
        let substituted = substitute_env_vars(raw)?;
        let config: GatewayConfig = serde_yaml::from_str(&substituted)?;
        validate(config)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    /// Returns `ConfigError` on parse, substitution, or validation failures
    pub fn from_toml_str(raw: &str) -> Result<GatewayConfig, ConfigError> {
        let substituted = substitute_env_vars(raw)?;
        let config: GatewayConfig = toml::from_str(&substituted)?;
        validate(config)
    }

    /// Parse and validate configuration from a JSON string
    ///
    /// # Errors
    /// Returns `ConfigError` on parse, substitution, or validation failures
    pub fn from_json_str(raw: &str) -> Result<GatewayConfig, ConfigError> {
        let substituted = substitute_env_vars(raw)?;
        let config: GatewayConfig = serde_json::from_str(&substituted)?;
        validate(config)
    }
}

fn validate(config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    config
        .validate_config()
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    Ok(config)
}

/// Replace `${VAR}` references with environment variable values
fn substitute_env_vars(raw: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated reference: keep as-is
            result.push_str(&rest[start..]);
            return Ok(result);
        };
        let name = &after[..end];
        let value = std::env::var(name).map_err(|_| ConfigError::EnvVarNotFound {
            name: name.to_string(),
        })?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
