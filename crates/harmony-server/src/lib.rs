//! # Harmony Server
//!
//! Hyper/Tokio transport for a Harmony [`Dispatcher`](harmony_core::Dispatcher).
//!
//! - HTTP/1.1 with keep-alive and protocol upgrades
//! - bounded request bodies (`413` past the limit)
//! - streaming responses with flush support
//! - graceful shutdown with a deadline
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use harmony_core::{Context, Harmony};
//! use harmony_server::{Server, ServerConfig};
//! use http::StatusCode;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut app = Harmony::new();
//! app.get("/", |ctx: &mut Context| ctx.string(StatusCode::OK, "hello"), &[]);
//!
//! let config = ServerConfig::builder().http_addr("127.0.0.1:0").build();
//! let mut server = Server::new(config, app.build()?);
//! let addr = server.start().await?;
//! println!("listening on {addr}");
//!
//! server.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/harmony-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
mod server;
pub mod shutdown;
mod writer;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::ServerError;
pub use server::{ResponseBody, Server};
pub use shutdown::{os_signal, ConnectionToken, ConnectionTracker, ShutdownSignal};
pub use writer::HyperResponseWriter;
