//! Per-request skip predicates.

use std::sync::Arc;

use harmony_core::Context;

/// Decides, per request, whether a middleware should pass straight through.
pub type Skipper = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// A skipper that never skips.
pub fn default_skipper() -> Skipper {
    Arc::new(|_| false)
}

/// Boxes a closure as a [`Skipper`].
pub fn skipper<F>(f: F) -> Skipper
where
    F: Fn(&Context) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Skips requests whose path starts with any of `prefixes`.
pub fn skip_path_prefixes<I, S>(prefixes: I) -> Skipper
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
    Arc::new(move |ctx| {
        let path = ctx.request().path();
        prefixes.iter().any(|p| path.starts_with(p.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmony_core::testing::{ResponseRecorder, TestRequest};
    use harmony_core::Binder;

    fn context(path: &'static str) -> Context {
        Context::new(
            TestRequest::get(path).build(),
            Box::new(ResponseRecorder::new()),
            Arc::new(Binder::new()),
        )
    }

    #[test]
    fn test_default_never_skips() {
        assert!(!default_skipper()(&context("/anything")));
    }

    #[test]
    fn test_path_prefixes() {
        let skip = skip_path_prefixes(["/health", "/metrics"]);
        assert!(skip(&context("/health/live")));
        assert!(skip(&context("/metrics")));
        assert!(!skip(&context("/api/users")));
    }
}
