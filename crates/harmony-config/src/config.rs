//! Main configuration types.
//!
//! This module provides the top-level [`HarmonyConfig`] struct and its builder.

use std::net::SocketAddr;

use harmony_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, GzipConfigSection, LoggerConfigSection, ServerConfig};

/// Complete Harmony service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// ```
/// use harmony_config::HarmonyConfig;
///
/// let config = HarmonyConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.gzip.level, -1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct HarmonyConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Gzip middleware configuration.
    #[serde(default)]
    pub gzip: GzipConfigSection,

    /// Access-log middleware configuration.
    #[serde(default)]
    pub logger: LoggerConfigSection,

    /// Diagnostic logging configuration.
    #[serde(default)]
    pub logging: LogConfig,
}

impl HarmonyConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> HarmonyConfigBuilder {
        HarmonyConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - the server address does not parse
    /// - the gzip level is outside `-1..=9`
    /// - the logger format is empty while the logger is enabled
    /// - the log filter directive does not parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }

        if !(-1..=9).contains(&self.gzip.level) {
            return Err(ConfigError::invalid_value(
                "gzip.level",
                format!("must be between -1 and 9, got {}", self.gzip.level),
            ));
        }

        if self.logger.enabled && self.logger.format.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "logger.format",
                "must not be empty",
            ));
        }

        if let Err(e) = harmony_telemetry::create_env_filter(&self.logging.level) {
            return Err(ConfigError::invalid_value("logging.level", e.to_string()));
        }

        Ok(())
    }

    /// The parsed bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.http_addr.parse().map_err(|_| {
            ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            )
        })
    }

    /// Local development preset: pretty debug logs, no compression.
    ///
    /// ```
    /// use harmony_config::HarmonyConfig;
    ///
    /// let config = HarmonyConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert!(!config.gzip.enabled);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.gzip.enabled = false;
        config.logging = LogConfig::development();
        config
    }

    /// Production preset: JSON logs, compression above 1 KiB.
    ///
    /// ```
    /// use harmony_config::HarmonyConfig;
    ///
    /// let config = HarmonyConfig::production();
    /// assert_eq!(config.logging.format, harmony_telemetry::LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.gzip.min_length = 1024;
        config.logging = LogConfig::production();
        config.logging.format = LogFormat::Json;
        config
    }
}

/// Builder for [`HarmonyConfig`].
#[derive(Debug, Default)]
pub struct HarmonyConfigBuilder {
    server: Option<ServerConfig>,
    gzip: Option<GzipConfigSection>,
    logger: Option<LoggerConfigSection>,
    logging: Option<LogConfig>,
}

impl HarmonyConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the gzip configuration.
    #[must_use]
    pub fn gzip(mut self, gzip: GzipConfigSection) -> Self {
        self.gzip = Some(gzip);
        self
    }

    /// Set the access-log configuration.
    #[must_use]
    pub fn logger(mut self, logger: LoggerConfigSection) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the diagnostic logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LogConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> HarmonyConfig {
        HarmonyConfig {
            server: self.server.unwrap_or_default(),
            gzip: self.gzip.unwrap_or_default(),
            logger: self.logger.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<HarmonyConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
