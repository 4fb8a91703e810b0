//! Path-prefixed route groups.

use crate::context::Context;
use crate::dispatch::Harmony;
use crate::error::Result;
use crate::handler::{Handler, Middleware};

use http::Method;
use std::sync::Arc;

/// A set of routes sharing a path prefix and middleware.
///
/// Routes are registered straight into the parent [`Harmony`] under the
/// concatenated path. Group middleware wraps route middleware; nested
/// groups inherit the middleware their parent has at the time they are
/// opened.
///
/// ```
/// use harmony_core::{Context, Harmony};
/// use http::StatusCode;
///
/// let mut app = Harmony::new();
/// {
///     let mut api = app.group("/api", &[]);
///     let mut v1 = api.group("/v1", &[]);
///     v1.get("/health", |ctx: &mut Context| ctx.send_status(StatusCode::OK), &[]);
/// }
/// assert_eq!(app.build().unwrap().route_count(), 1);
/// ```
pub struct Group<'a> {
    app: &'a mut Harmony,
    prefix: String,
    middlewares: Vec<Middleware>,
}

impl std::fmt::Debug for Group<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("prefix", &self.prefix)
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

impl<'a> Group<'a> {
    pub(crate) fn new(app: &'a mut Harmony, prefix: String, middlewares: Vec<Middleware>) -> Self {
        Self {
            app,
            prefix,
            middlewares,
        }
    }

    /// The full prefix of this group.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Appends middleware for routes registered after this call.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Opens a nested group under `prefix`.
    pub fn group(&mut self, prefix: &str, middlewares: &[Middleware]) -> Group<'_> {
        let mut inherited = self.middlewares.clone();
        inherited.extend_from_slice(middlewares);
        Group::new(self.app, join_paths(&self.prefix, prefix), inherited)
    }

    /// Registers `handler` for `method` under the group prefix.
    pub fn add<F>(
        &mut self,
        method: Method,
        path: &str,
        handler: F,
        middlewares: &[Middleware],
    ) -> &mut Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.add_handler(method, path, Arc::new(handler), middlewares)
    }

    /// Like [`add`](Self::add) for an already boxed [`Handler`].
    pub fn add_handler(
        &mut self,
        method: Method,
        path: &str,
        handler: Handler,
        middlewares: &[Middleware],
    ) -> &mut Self {
        let mut stack = self.middlewares.clone();
        stack.extend_from_slice(middlewares);
        self.app
            .add_handler(method, &join_paths(&self.prefix, path), handler, &stack);
        self
    }
}

route_methods!(Harmony);
route_methods!(Group<'_>);

fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if path.is_empty() {
        return if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        };
    }
    if path.starts_with('/') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}/{path}")
    }
}
