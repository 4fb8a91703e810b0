//! Router front end over the radix tree.

use http::Method;

use crate::error::RouteError;
use crate::method_router::MethodRouter;
use crate::node::Node;
use crate::params::Params;
use crate::RouteMatch;

/// Outcome of looking up a request.
#[derive(Debug)]
pub enum Lookup<'a, T> {
    /// A value is registered for the method and path.
    Found(RouteMatch<'a, T>),
    /// The path exists but not for this method.
    MethodNotAllowed(Vec<Method>),
    /// No pattern matches the path.
    NotFound,
}

/// A radix tree router, generic over the value registered per route.
///
/// # Route priority
///
/// When several patterns could match, static segments win over `{param}`
/// segments, which win over `*wildcard` segments. A branch that fails deeper
/// down, or that has no value for the request method, falls back to the next
/// candidate. `405` is only reported when no matching branch has the method.
///
/// # Example
///
/// ```rust
/// use harmony_router::{Lookup, Router};
/// use http::Method;
///
/// let mut router = Router::new();
/// router.insert(Method::GET, "/users/{username}", "show").unwrap();
///
/// match router.lookup(&Method::GET, "/users/sujamess") {
///     Lookup::Found(m) => {
///         assert_eq!(*m.value, "show");
///         assert_eq!(m.params.get("username"), Some("sujamess"));
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Router<T> {
    root: Node<T>,
    route_count: usize,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Router<T> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            route_count: 0,
        }
    }

    /// Registers `value` for `method` on `path`.
    ///
    /// Fails if the pattern is malformed or the method is already taken for
    /// that pattern.
    pub fn insert(&mut self, method: Method, path: &str, value: T) -> Result<(), RouteError> {
        let methods = self.root.entry(path)?;
        if methods.contains(&method) {
            return Err(RouteError::Duplicate {
                method: method.to_string(),
                path: path.to_string(),
            });
        }
        methods.insert(method, value);
        self.route_count += 1;
        Ok(())
    }

    /// Looks up the value for a request.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, T> {
        let mut allowed = Vec::new();
        match self.root.match_route(method, path, &mut allowed) {
            Some((value, params)) => Lookup::Found(RouteMatch { value, params }),
            None if allowed.is_empty() => Lookup::NotFound,
            None => Lookup::MethodNotAllowed(allowed),
        }
    }

    /// Matches `path` regardless of method.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodRouter<T>, Params)> {
        self.root.match_path(path)
    }

    /// Rebuilds the router with every registered value passed through `f`.
    #[must_use]
    pub fn map<U>(self, mut f: impl FnMut(&Method, T) -> U) -> Router<U> {
        Router {
            root: self.root.map(&mut f),
            route_count: self.route_count,
        }
    }

    /// Number of `(method, path)` registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}
