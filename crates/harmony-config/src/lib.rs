//! Typed configuration for Harmony services.
//!
//! - TOML and JSON files
//! - `PREFIX__SECTION__KEY` environment overrides
//! - strict parsing: unknown fields are rejected
//! - validation before the configuration is handed out
//!
//! # Example
//!
//! ```no_run
//! use harmony_config::ConfigLoader;
//!
//! # fn main() -> Result<(), harmony_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_optional_file("harmony.toml")?
//!     .with_env_prefix("HARMONY")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # File format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! read_timeout_secs = 60
//! max_body_bytes = 4194304
//!
//! [gzip]
//! enabled = true
//! level = -1
//! min_length = 1024
//!
//! [logger]
//! format = "{remote_ip} {method} {path} {status} {latency}"
//!
//! [logging]
//! level = "info,harmony::access=info"
//! format = "json"
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{HarmonyConfig, HarmonyConfigBuilder};
pub use error::ConfigError;
pub use harmony_telemetry::{LogConfig, LogFormat};
pub use loader::ConfigLoader;
pub use schema::*;
