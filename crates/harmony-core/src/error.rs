//! Error types for Harmony.
//!
//! [`Error`] is returned by handlers, the binder, decorators and the pools.
//! The core never turns an error into a response on its own; the
//! dispatcher hands it to an error hook and middleware decides what the
//! client sees. [`Error::status_code`] is a convenience for hooks that want
//! a sensible default.

use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An HTTP-level failure carrying the status code a handler wants sent.
///
/// # Example
///
/// ```
/// use harmony_core::HttpError;
/// use http::StatusCode;
///
/// let err = HttpError::new(StatusCode::NOT_FOUND, "user not found");
/// assert_eq!(err.to_string(), "harmony: code=404, message=user not found");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// Status code to report.
    pub code: StatusCode,
    /// Human-readable message.
    pub message: String,
}

impl HttpError {
    /// Creates a new HTTP error.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an HTTP error whose message is the canonical reason phrase.
    pub fn from_status(code: StatusCode) -> Self {
        Self::new(code, code.canonical_reason().unwrap_or_default())
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "harmony: code={}, message={}",
            self.code.as_u16(),
            self.message
        )
    }
}

impl std::error::Error for HttpError {}

/// Standard error type for Harmony.
#[derive(Error, Debug)]
pub enum Error {
    /// The bind target's descriptor is malformed.
    #[error("invalid bind destination {type_name}: {reason}")]
    InvalidDestination {
        /// Rust type name of the destination.
        type_name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A path or query value could not be parsed into the field's type.
    #[error("cannot bind field '{field}' from {value:?} as {kind}: {reason}")]
    TypeCoercion {
        /// Destination field.
        field: &'static str,
        /// Raw value taken from the request.
        value: String,
        /// Expected kind, e.g. `i64` or `bool`.
        kind: &'static str,
        /// Parser message.
        reason: String,
    },

    /// The request body is not valid for the destination.
    #[error("failed to decode request body: {0}")]
    BodyDecode(#[source] serde_json::Error),

    /// A response body could not be serialized.
    #[error("failed to encode response body: {0}")]
    Encode(#[source] serde_json::Error),

    /// A writer capability (flush, hijack) is missing underneath a decorator.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation {
        /// Name of the capability.
        operation: &'static str,
    },

    /// Pool or resource acquisition failed.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },

    /// Transport I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A handler asked for a specific HTTP outcome.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A route could not be registered.
    #[error(transparent)]
    Route(#[from] harmony_router::RouteError),
}

impl Error {
    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub const fn unsupported(operation: &'static str) -> Self {
        Self::UnsupportedOperation { operation }
    }

    /// Returns a default status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Http(e) => e.code,
            Self::TypeCoercion { .. } | Self::BodyDecode(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedOperation { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::InvalidDestination { .. }
            | Self::Encode(_)
            | Self::Internal { .. }
            | Self::Io(_)
            | Self::Route(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = HttpError::new(StatusCode::BAD_REQUEST, "bad input");
        assert_eq!(err.to_string(), "harmony: code=400, message=bad input");
    }

    #[test]
    fn test_http_error_from_status() {
        let err = HttpError::from_status(StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Not Found");
    }

    #[test]
    fn test_http_error_converts_and_keeps_code() {
        let err: Error = HttpError::new(StatusCode::CONFLICT, "taken").into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "harmony: code=409, message=taken");
    }

    #[test]
    fn test_status_codes() {
        let coercion = Error::TypeCoercion {
            field: "age",
            value: "abc".into(),
            kind: "i64",
            reason: "invalid digit found in string".into(),
        };
        assert_eq!(coercion.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::unsupported("hijack").status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            Error::internal("pool").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_coercion_message_names_field() {
        let err = Error::TypeCoercion {
            field: "is_active",
            value: "maybe".into(),
            kind: "bool",
            reason: "invalid boolean".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot bind field 'is_active' from \"maybe\" as bool: invalid boolean"
        );
    }
}
