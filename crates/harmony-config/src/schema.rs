//! Configuration schema types.
//!
//! This module defines the structure of every configuration section. All
//! sections reject unknown fields and fill missing ones with defaults.

use serde::{Deserialize, Serialize};

/// Default HTTP bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default access-log template.
pub const DEFAULT_LOGGER_FORMAT: &str =
    r#"{remote_ip} - {host} "{method} {path} {protocol}" {status} {latency}"#;

/// Server configuration section.
///
/// # Example
///
/// ```
/// use harmony_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:3000".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.read_timeout_secs, 60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Time allowed to read a request head and body, in seconds.
    #[serde(default = "default_io_timeout")]
    pub read_timeout_secs: u64,

    /// Time allowed to produce and write a response, in seconds.
    #[serde(default = "default_io_timeout")]
    pub write_timeout_secs: u64,

    /// Keep-alive idle timeout, in seconds.
    #[serde(default = "default_io_timeout")]
    pub idle_timeout_secs: u64,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Largest request body accepted, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            read_timeout_secs: default_io_timeout(),
            write_timeout_secs: default_io_timeout(),
            idle_timeout_secs: default_io_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> String {
    DEFAULT_HTTP_ADDR.to_string()
}

fn default_io_timeout() -> u64 {
    60
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

/// Gzip middleware section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GzipConfigSection {
    /// Install the gzip middleware.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Compression level: `-1` for the default, `0` to store, `1..=9`.
    #[serde(default = "default_gzip_level")]
    pub level: i32,

    /// Body length in bytes at which responses are compressed.
    #[serde(default)]
    pub min_length: usize,
}

impl Default for GzipConfigSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_gzip_level(),
            min_length: 0,
        }
    }
}

fn default_gzip_level() -> i32 {
    -1
}

/// Access-log middleware section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfigSection {
    /// Install the access-log middleware.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Line template.
    #[serde(default = "default_logger_format")]
    pub format: String,
}

impl Default for LoggerConfigSection {
    fn default() -> Self {
        Self {
            enabled: true,
            format: default_logger_format(),
        }
    }
}

fn default_logger_format() -> String {
    DEFAULT_LOGGER_FORMAT.to_string()
}

fn default_true() -> bool {
    true
}
