//! Layered configuration loading.
//!
//! Layers are applied in order, later ones winning:
//! 1. built-in defaults or a preset
//! 2. a TOML or JSON file (or string)
//! 3. environment variables under a prefix

use std::env;
use std::fs;
use std::path::Path;

use harmony_telemetry::LogFormat;

use crate::{ConfigError, HarmonyConfig};

/// Builds a [`HarmonyConfig`] from defaults, files and the environment.
///
/// ```no_run
/// use harmony_config::ConfigLoader;
///
/// # fn main() -> Result<(), harmony_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("harmony.toml")?
///     .with_env_prefix("HARMONY")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HarmonyConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader seeded with [`HarmonyConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HarmonyConfig::default(),
            env_prefix: None,
        }
    }

    /// Reset to the built-in defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = HarmonyConfig::default();
        self
    }

    /// Start from [`HarmonyConfig::development`].
    ///
    /// ```
    /// use harmony_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = HarmonyConfig::development();
        self
    }

    /// Start from [`HarmonyConfig::production`].
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = HarmonyConfig::production();
        self
    }

    /// Load a `.toml` or `.json` file. The format follows the extension.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed, carries unknown
    /// fields, or has an unsupported extension.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        self.config = parse(&content, format)?;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is not an error.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration text in the named format (`"toml"` or `"json"`).
    ///
    /// ```
    /// use harmony_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [gzip]
    ///     level = 9
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.gzip.level, 9);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, format)?;
        Ok(self)
    }

    /// Read overrides from `PREFIX__SECTION__KEY` variables at load time.
    ///
    /// With prefix `HARMONY`, `HARMONY__GZIP__LEVEL=9` sets `gzip.level`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the working directory or its parents, if any.
    ///
    /// # Errors
    ///
    /// Fails if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment overrides, validate, and return the configuration.
    ///
    /// # Errors
    ///
    /// Fails if an override does not parse or validation fails.
    pub fn load(mut self) -> Result<HarmonyConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Return the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> HarmonyConfig {
        self.config
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let scoped = format!("{prefix}__");
        let mut vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with(&scoped))
            .collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let rest = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_var(key, "invalid key format"))?;

        let parts: Vec<&str> = rest.split("__").collect();

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => self.config.server.http_addr = value.to_string(),
            ["SERVER", "READ_TIMEOUT_SECS"] => {
                self.config.server.read_timeout_secs = parse_int(key, value)?;
            }
            ["SERVER", "WRITE_TIMEOUT_SECS"] => {
                self.config.server.write_timeout_secs = parse_int(key, value)?;
            }
            ["SERVER", "IDLE_TIMEOUT_SECS"] => {
                self.config.server.idle_timeout_secs = parse_int(key, value)?;
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                self.config.server.shutdown_timeout_secs = parse_int(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => {
                self.config.server.max_body_bytes = parse_int(key, value)?;
            }

            ["GZIP", "ENABLED"] => self.config.gzip.enabled = parse_flag(key, value)?,
            ["GZIP", "LEVEL"] => self.config.gzip.level = parse_int(key, value)?,
            ["GZIP", "MIN_LENGTH"] => self.config.gzip.min_length = parse_int(key, value)?,

            ["LOGGER", "ENABLED"] => self.config.logger.enabled = parse_flag(key, value)?,
            ["LOGGER", "FORMAT"] => self.config.logger.format = value.to_string(),

            ["LOGGING", "ENABLED"] => self.config.logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => self.config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_var(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => {
                self.config.logging.ansi_enabled = parse_flag(key, value)?;
            }

            _ => {}
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<HarmonyConfig, ConfigError> {
    match format.to_lowercase().as_str() {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_var(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_var(key, "expected boolean"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
