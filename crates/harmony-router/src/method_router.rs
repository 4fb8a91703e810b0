//! Per-path method table.

use http::Method;

/// Maps HTTP methods to the values registered for a single path.
///
/// Any [`Method`] is accepted, extension methods included. Lookups are a
/// linear scan; a path rarely carries more than a handful of methods.
///
/// # Example
///
/// ```rust
/// use harmony_router::MethodRouter;
/// use http::Method;
///
/// let mut methods = MethodRouter::new();
/// methods.insert(Method::GET, "list");
/// methods.insert(Method::POST, "create");
///
/// assert_eq!(methods.get(&Method::GET), Some(&"list"));
/// assert_eq!(methods.get(&Method::DELETE), None);
/// ```
#[derive(Debug, Clone)]
pub struct MethodRouter<T> {
    entries: Vec<(Method, T)>,
}

impl<T> Default for MethodRouter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MethodRouter<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `value` for `method`, returning the value it replaced.
    pub fn insert(&mut self, method: Method, value: T) -> Option<T> {
        if let Some(slot) = self.entries.iter_mut().find(|(m, _)| *m == method) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((method, value));
        None
    }

    /// Returns the value registered for `method`.
    #[must_use]
    pub fn get(&self, method: &Method) -> Option<&T> {
        self.entries
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, v)| v)
    }

    /// Returns true if `method` has a registration.
    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        self.get(method).is_some()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Methods registered for this path, in registration order.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        self.entries.iter().map(|(m, _)| m.clone()).collect()
    }

    /// Applies `f` to every registered value, keeping the method table shape.
    #[must_use]
    pub fn map<U>(self, mut f: impl FnMut(&Method, T) -> U) -> MethodRouter<U> {
        MethodRouter {
            entries: self
                .entries
                .into_iter()
                .map(|(m, v)| {
                    let mapped = f(&m, v);
                    (m, mapped)
                })
                .collect(),
        }
    }
}
