//! Structured logging setup.
//!
//! Builds a `tracing-subscriber` registry with an [`EnvFilter`] and a single
//! formatting layer, JSON for machines or pretty for humans.

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// Logging configuration.
///
/// Doubles as the `[logging]` section of the Harmony configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Install a subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive, e.g. `info` or `info,harmony::access=warn`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Emit ANSI colours.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line.
    #[serde(default)]
    pub include_location: bool,

    /// Include the event target, e.g. `harmony::access`.
    #[serde(default = "default_true")]
    pub include_target: bool,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
            include_target: true,
            thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Pretty, coloured, debug-level output for local work.
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            ansi_enabled: true,
            include_location: true,
            ..Self::default()
        }
    }

    /// JSON, info-level output.
    pub fn production() -> Self {
        Self::default()
    }
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

/// Installs the global subscriber described by `config`.
///
/// Does nothing when `config.enabled` is false. Fails if the filter does
/// not parse or a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    match config.format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(config.ansi_enabled)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.thread_ids)
                .with_target(config.include_target)
                .with_filter(filter);
            tracing_subscriber::registry()
                .with(layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
        }
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_ansi(config.ansi_enabled)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.thread_ids)
                .with_target(config.include_target)
                .with_filter(filter);
            tracing_subscriber::registry()
                .with(layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
        }
    }
}

/// Parses a filter directive such as `info,harmony::access=debug`.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| TelemetryError::InvalidFilter {
        filter: filter.to_string(),
        reason: e.to_string(),
    })
}
