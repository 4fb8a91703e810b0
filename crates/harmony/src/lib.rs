//! # Harmony
//!
//! A small HTTP framework built around one per-request pipeline:
//!
//! - a pooled [`Context`](core::Context) per request
//! - onion-style middleware around every handler
//! - `#[derive(Bind)]` binding of path, query and JSON body values
//! - response decorators for gzip compression and access logging
//! - a hyper/tokio server with graceful shutdown
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use harmony::prelude::*;
//!
//! #[derive(Default, Bind)]
//! #[bind(crate = "harmony::core")]
//! struct ShowUser {
//!     #[bind(path = "username")]
//!     name: String,
//!     #[bind(query = "is_active")]
//!     active: String,
//!     title: String,
//! }
//!
//! fn show_user(ctx: &mut Context) -> Result<()> {
//!     let mut user = ShowUser::default();
//!     ctx.bind(&mut user)?;
//!     ctx.string(StatusCode::OK, &format!("{} {} {}", user.name, user.active, user.title))
//! }
//!
//! # async fn run() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().with_env_prefix("HARMONY").load()?;
//! harmony::telemetry::init_logging(&config.logging)?;
//!
//! let mut app = Harmony::new();
//! app.post("/users/:username", show_user, &[]);
//!
//! harmony::settings::server(&config, app)?.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! hyper ─► Dispatcher ─► logger ─► gzip ─► route middleware ─► handler
//!                          │         │
//!             LoggerResponseWriter  GzipResponseWriter ─► HyperResponseWriter
//! ```

#![doc(html_root_url = "https://docs.rs/harmony/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use harmony_config as config;
pub use harmony_core as core;
pub use harmony_middleware as middleware;
pub use harmony_router as router;
pub use harmony_server as server;
pub use harmony_telemetry as telemetry;

pub mod settings;

/// Common imports for applications.
///
/// ```rust
/// use harmony::prelude::*;
/// ```
pub mod prelude {
    pub use harmony_config::{ConfigLoader, HarmonyConfig};
    pub use harmony_core::{
        handler, middleware, Bind, Binder, Context, Error, Group, Handler, Harmony, HttpError,
        Middleware, ResponseWriter, Result,
    };
    pub use harmony_middleware::{gzip, logger, Gzip, Logger};
    pub use harmony_server::{Server, ServerConfig};
    pub use http::{Method, StatusCode};
}
