//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while loading or validating a [`HarmonyConfig`](crate::HarmonyConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("no configuration file at {path}")]
    NotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("cannot read {path}")]
    Read {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error, including unknown fields.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error, including unknown fields.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported file extension or format name.
    #[error("unsupported configuration format `{0}`")]
    UnsupportedFormat(String),

    /// Invalid configuration value.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// Environment variable parsing error.
    #[error("environment variable {var}: {reason}")]
    EnvVar {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },

    /// `.env` file could not be loaded.
    #[error("cannot load .env: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

impl ConfigError {
    /// A missing file.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// An unreadable file.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// A value that failed validation.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// An override that could not be parsed.
    pub fn env_var(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvVar {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_error() {
        let err = ConfigError::not_found("/path/to/harmony.toml");
        assert!(err.to_string().contains("/path/to/harmony.toml"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("gzip.level", "must be between -1 and 9");
        assert_eq!(err.to_string(), "gzip.level: must be between -1 and 9");
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_var("HARMONY__GZIP__MIN_LENGTH", "expected integer");
        assert!(err.to_string().contains("HARMONY__GZIP__MIN_LENGTH"));
        assert!(err.to_string().contains("expected integer"));
    }
}
