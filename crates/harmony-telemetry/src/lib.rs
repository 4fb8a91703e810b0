//! # Harmony Telemetry
//!
//! Installs the process-wide `tracing` subscriber for Harmony services.
//!
//! Everything in Harmony reports through `tracing`: the access log from
//! `harmony-middleware` is an `INFO` event on the `harmony::access`
//! target, handler errors are reported by the dispatcher's default error
//! hook, and the server logs connection and shutdown events. This crate
//! turns those events into JSON lines or pretty output.
//!
//! ```no_run
//! use harmony_telemetry::{init_logging, LogConfig, LogFormat};
//!
//! # fn main() -> Result<(), harmony_telemetry::TelemetryError> {
//! init_logging(&LogConfig {
//!     level: "info,harmony::access=info".to_string(),
//!     format: LogFormat::Pretty,
//!     ..LogConfig::default()
//! })?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/harmony-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
