//! Route registration errors.

use thiserror::Error;

/// A route pattern that cannot be added to the tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// A `*name` segment was followed by more segments.
    #[error("wildcard must be the last segment in '{path}'")]
    WildcardNotLast {
        /// Offending pattern.
        path: String,
    },

    /// Two patterns use different variable names at the same position.
    #[error("'{path}' conflicts with existing variable '{existing}'")]
    ParamConflict {
        /// Offending pattern.
        path: String,
        /// Segment already registered at that position.
        existing: String,
    },

    /// A `{}` or `:` segment with no name.
    #[error("empty variable name in '{path}'")]
    EmptyParamName {
        /// Offending pattern.
        path: String,
    },

    /// The same method was registered twice for one pattern.
    #[error("{method} {path} is already registered")]
    Duplicate {
        /// HTTP method.
        method: String,
        /// Offending pattern.
        path: String,
    },
}
