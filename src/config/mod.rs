//! Configuration module
//!
//! Handles loading of the YAML configuration file with environment variable
//! expansion and validation. The authenticator itself is described by a
//! single URI, see [`crate::auth::new_auth`].

use crate::auth::{self, AuthError, Authenticator};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod duration;
mod loader;

pub use duration::{parse_duration, DurationError, SignedDuration};
pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}") else {
        return s.to_string();
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub auth: AuthConfig,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Authenticator URI, e.g. `basicfile://?path=/etc/dumbproxy.htpasswd`
    #[serde(default = "default_auth_uri")]
    pub uri: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            uri: default_auth_uri(),
        }
    }
}

fn default_auth_uri() -> String {
    "none://".to_string()
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri = self.auth.uri.trim();
        if uri.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.uri cannot be empty".into(),
            ));
        }

        url::Url::parse(uri).map_err(|e| {
            ConfigError::ValidationError(format!("Invalid auth.uri '{}': {}", uri, e))
        })?;

        Ok(())
    }

    /// Construct the configured authenticator
    pub fn build_authenticator(&self) -> Result<Box<dyn Authenticator>, AuthError> {
        auth::new_auth(self.auth.uri.trim())
    }
}
