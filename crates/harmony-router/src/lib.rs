//! Radix tree router for Harmony.
//!
//! The dispatcher treats this crate as an opaque matcher: it registers one
//! value per `(method, pattern)` pair and, per request, gets back the value
//! together with the captured path variables.
//!
//! Patterns support:
//!
//! - static segments (`/users`)
//! - single-segment variables (`/users/{id}` or `/users/:id`)
//! - a trailing catch-all (`/files/*path`)

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod method_router;
mod node;
mod params;
mod router;

pub use error::RouteError;
pub use method_router::MethodRouter;
pub use node::{Node, SegmentKind};
pub use params::Params;
pub use router::{Lookup, Router};

/// A successful lookup: the registered value plus captured variables.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    /// Value registered for the route.
    pub value: &'a T,
    /// Variables captured from the path.
    pub params: Params,
}
