//! # Harmony Middleware
//!
//! Response decorators for the Harmony framework.
//!
//! | Middleware | Writer | Purpose |
//! |------------|--------|---------|
//! | [`gzip`](gzip::gzip) | [`GzipResponseWriter`] | Threshold-based gzip compression |
//! | [`logger`](logger::logger) | [`LoggerResponseWriter`] | One access-log line per request |
//!
//! Both are ordinary [`Middleware`](harmony_core::Middleware) values and are
//! usually installed globally so they see every route:
//!
//! ```
//! use harmony_core::Harmony;
//! use harmony_middleware::{gzip, logger};
//!
//! let mut app = Harmony::new();
//! app.use_middleware(logger())
//!     .use_middleware(gzip());
//! ```
//!
//! Registration order matters: the logger above wraps gzip, so it observes
//! the status the handler wrote, not the compressed byte count.

#![doc(html_root_url = "https://docs.rs/harmony-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod gzip;
pub mod logger;
pub mod skipper;
pub mod sniff;

pub use gzip::{gzip, gzip_with_config, Gzip, GzipConfig, GzipResponseWriter};
pub use logger::{
    logger, logger_with_config, Logger, LoggerConfig, LoggerResponseWriter, Template,
    DEFAULT_LOGGER_FORMAT,
};
pub use skipper::{default_skipper, skipper, Skipper};
pub use sniff::detect_content_type;
