//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors from starting or stopping a [`Server`](crate::Server).
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid address '{addr}': {source}")]
    InvalidAddress {
        /// Address as configured.
        addr: String,
        /// Parser error.
        #[source]
        source: std::net::AddrParseError,
    },

    /// The listener could not be bound.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// Address that was tried.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Listener I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// `start` was called on a running server.
    #[error("server is already running")]
    AlreadyRunning,

    /// `shutdown` was called on a server that is not running.
    #[error("server is not running")]
    NotRunning,

    /// Connections were still open when the shutdown deadline passed.
    #[error("shutdown deadline exceeded with {active} connections still open")]
    ShutdownTimeout {
        /// Connections left open.
        active: usize,
    },

    /// The accept loop task failed.
    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ServerError::NotRunning.to_string(), "server is not running");
        assert_eq!(
            ServerError::ShutdownTimeout { active: 2 }.to_string(),
            "shutdown deadline exceeded with 2 connections still open"
        );

        let source = "nope".parse::<SocketAddr>().unwrap_err();
        let err = ServerError::InvalidAddress {
            addr: "nope".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("invalid address 'nope'"));
    }
}
