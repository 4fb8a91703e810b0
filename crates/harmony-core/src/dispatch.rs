//! Route registration and request dispatch.
//!
//! [`Harmony`] collects routes and middleware. [`Harmony::build`] freezes
//! them into a [`Dispatcher`]: every route handler is composed with its
//! route middleware at registration and with the global middleware at
//! build time, so serving a request does no wrapping at all.

use std::fmt;
use std::sync::Arc;

use harmony_router::{Lookup, Router};
use http::{header, HeaderValue, Method, StatusCode};

use crate::bind::Binder;
use crate::context::Context;
use crate::error::{Error, HttpError, Result};
use crate::group::Group;
use crate::handler::{chain, handler, Handler, Middleware};
use crate::pool::Pool;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Called with the context and error when a handler chain fails.
pub type ErrorHook = Arc<dyn Fn(&mut Context, &Error) + Send + Sync>;

/// Side-channel key under which the fallback handler finds the methods
/// allowed for a matched path.
pub const ALLOWED_METHODS_KEY: &str = "harmony.allowed_methods";

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// Application builder: routes, middleware and dispatch settings.
///
/// # Example
///
/// ```
/// use harmony_core::{Context, Harmony};
/// use http::StatusCode;
///
/// let mut app = Harmony::new();
/// app.get("/ping", |ctx: &mut Context| ctx.string(StatusCode::OK, "pong"), &[]);
///
/// let mut api = app.group("/api/v1", &[]);
/// api.get("/users/{id}", |ctx: &mut Context| {
///     let id = ctx.path_param_int("id")?;
///     ctx.json(StatusCode::OK, &id)
/// }, &[]);
///
/// let dispatcher = app.build().unwrap();
/// assert_eq!(dispatcher.route_count(), 2);
/// ```
pub struct Harmony {
    routes: Vec<Route>,
    middlewares: Vec<Middleware>,
    fallback: Option<Handler>,
    on_error: Option<ErrorHook>,
    binder: Binder,
    max_idle_contexts: Option<usize>,
}

impl fmt::Debug for Harmony {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harmony")
            .field("routes", &self.routes.len())
            .field("middlewares", &self.middlewares.len())
            .field("binder", &self.binder)
            .finish_non_exhaustive()
    }
}

impl Default for Harmony {
    fn default() -> Self {
        Self::new()
    }
}

impl Harmony {
    /// Creates an empty application.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            middlewares: Vec::new(),
            fallback: None,
            on_error: None,
            binder: Binder::default(),
            max_idle_contexts: None,
        }
    }

    /// Appends global middleware. It wraps every route and the fallback.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Registers `handler` for `method` and `path`, wrapped in `middlewares`
    /// with the first one outermost.
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
        self.routes.push(Route {
            method,
            path: path.to_string(),
            handler: chain(handler, middlewares),
        });
        self
    }

    /// Opens a path-prefixed group. Routes added through it are registered
    /// here under `prefix` and wrapped in the group's middleware.
    pub fn group(&mut self, prefix: &str, middlewares: &[Middleware]) -> Group<'_> {
        Group::new(self, prefix.to_string(), middlewares.to_vec())
    }

    /// Replaces the handler for unmatched requests.
    ///
    /// The default answers `404 Not Found`, or `405 Method Not Allowed` with
    /// an `Allow` header when the path exists under another method.
    pub fn fallback<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// Replaces the hook that receives handler errors.
    ///
    /// The default logs the error and leaves the response untouched.
    pub fn on_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Context, &Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Replaces the binder shared by every context.
    pub fn binder(&mut self, binder: Binder) -> &mut Self {
        self.binder = binder;
        self
    }

    /// Caps the number of idle contexts kept for reuse.
    pub fn max_idle_contexts(&mut self, max: usize) -> &mut Self {
        self.max_idle_contexts = Some(max);
        self
    }

    /// Freezes the application into a dispatcher.
    ///
    /// Fails if a route pattern is malformed or registered twice.
    pub fn build(self) -> Result<Dispatcher> {
        let mut router = Router::new();
        for route in self.routes {
            router.insert(route.method, &route.path, route.handler)?;
        }

        let global = self.middlewares;
        let router = router.map(|_, h| chain(h, &global));
        let fallback = chain(
            self.fallback.unwrap_or_else(|| handler(default_fallback)),
            &global,
        );

        let binder = Arc::new(self.binder);
        let factory_binder = binder.clone();
        let mut contexts = Pool::new(move || Context::with_binder(factory_binder.clone()));
        if let Some(max) = self.max_idle_contexts {
            contexts = contexts.max_idle(max);
        }

        Ok(Dispatcher {
            router,
            fallback,
            contexts,
            on_error: self.on_error.unwrap_or_else(|| Arc::new(log_error)),
        })
    }
}

fn default_fallback(ctx: &mut Context) -> Result<()> {
    let allowed = ctx.get_as::<Vec<Method>>(ALLOWED_METHODS_KEY);
    match allowed {
        Some(methods) => {
            let allow = methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                ctx.response().headers_mut().insert(header::ALLOW, value);
            }
            ctx.string(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
        None => ctx.string(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn log_error(ctx: &mut Context, err: &Error) {
    let request = ctx.request();
    match err {
        Error::Http(HttpError { code, .. }) if code.is_client_error() => tracing::debug!(
            method = %request.method(),
            path = request.path(),
            error = %err,
            "handler returned an error"
        ),
        _ => tracing::warn!(
            method = %request.method(),
            path = request.path(),
            error = %err,
            "handler returned an error"
        ),
    }
}

/// Immutable routing table plus the context pool.
///
/// Shared between connection tasks behind an `Arc`.
pub struct Dispatcher {
    router: Router<Handler>,
    fallback: Handler,
    contexts: Pool<Context>,
    on_error: ErrorHook,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.router.len())
            .field("contexts", &self.contexts)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Serves one request.
    ///
    /// A pooled context is attached to `request` and `writer`, run through
    /// the matched chain and released afterwards, also when the chain
    /// panics. Handler errors go to the error hook; only a failure to
    /// obtain a context is returned.
    pub fn serve(&self, mut request: Request, writer: Box<dyn ResponseWriter>) -> Result<()> {
        let mut ctx = self.contexts.get()?;

        let route = match self.router.lookup(request.method(), request.path()) {
            Lookup::Found(matched) => {
                request.set_params(matched.params);
                matched.value.clone()
            }
            Lookup::MethodNotAllowed(allowed) => {
                ctx.set(ALLOWED_METHODS_KEY, allowed);
                self.fallback.clone()
            }
            Lookup::NotFound => self.fallback.clone(),
        };

        ctx.attach(request, writer);
        if let Err(err) = route(&mut *ctx) {
            (self.on_error)(&mut *ctx, &err);
        }
        Ok(())
    }

    /// Number of registered routes.
    pub fn route_count(&self) -> usize {
        self.router.len()
    }

    /// Number of idle pooled contexts.
    pub fn idle_contexts(&self) -> usize {
        self.contexts.idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::middleware;
    use crate::testing::{Recording, ResponseRecorder, TestRequest};
    use parking_lot::Mutex;

    fn serve(dispatcher: &Dispatcher, request: Request) -> Recording {
        let recorder = ResponseRecorder::new();
        let recording = recorder.recording();
        dispatcher.serve(request, Box::new(recorder)).unwrap();
        recording
    }

    fn append(log: &Arc<Mutex<String>>, mark: &'static str) -> Middleware {
        let log = log.clone();
        middleware(move |next| {
            let log = log.clone();
            handler(move |ctx| {
                log.lock().push_str(mark);
                next(ctx)
            })
        })
    }

    #[test]
    fn test_route_middleware_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut app = Harmony::new();
        let handler_log = log.clone();
        app.get(
            "/",
            move |_| {
                handler_log.lock().push('2');
                Ok(())
            },
            &[append(&log, "1"), append(&log, "1")],
        );

        let dispatcher = app.build().unwrap();
        serve(&dispatcher, TestRequest::get("/").build());
        assert_eq!(*log.lock(), "112");
    }

    #[test]
    fn test_global_middleware_wraps_route_middleware() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut app = Harmony::new();
        app.use_middleware(append(&log, "g1"));
        app.use_middleware(append(&log, "g2"));
        app.get("/", |_| Ok(()), &[append(&log, "r")]);

        let dispatcher = app.build().unwrap();
        serve(&dispatcher, TestRequest::get("/").build());
        assert_eq!(*log.lock(), "g1g2r");
    }

    #[test]
    fn test_path_params_reach_handler() {
        let mut app = Harmony::new();
        app.get(
            "/users/{username}",
            |ctx| {
                let name = ctx.path_param("username").to_string();
                ctx.string(StatusCode::OK, &name)
            },
            &[],
        );

        let recording = serve(&app.build().unwrap(), TestRequest::get("/users/sujamess").build());
        assert_eq!(recording.body_string(), "sujamess");
    }

    #[test]
    fn test_not_found_and_method_not_allowed() {
        let mut app = Harmony::new();
        app.get("/users", |_| Ok(()), &[]);
        app.post("/users", |_| Ok(()), &[]);
        let dispatcher = app.build().unwrap();

        let missing = serve(&dispatcher, TestRequest::get("/posts").build());
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let wrong = serve(&dispatcher, TestRequest::new(Method::DELETE, "/users").build());
        assert_eq!(wrong.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(wrong.header("allow").as_deref(), Some("GET, POST"));
    }

    #[test]
    fn test_method_picks_param_route_over_static_sibling() {
        let mut app = Harmony::new();
        app.get("/users/me", |ctx| ctx.string(StatusCode::OK, "profile"), &[]);
        app.post(
            "/users/{id}",
            |ctx| {
                let id = ctx.path_param("id").to_string();
                ctx.string(StatusCode::OK, &id)
            },
            &[],
        );
        let dispatcher = app.build().unwrap();

        let recording = serve(&dispatcher, TestRequest::post("/users/me").build());
        assert_eq!(recording.status(), StatusCode::OK);
        assert_eq!(recording.body_string(), "me");

        let recording = serve(&dispatcher, TestRequest::get("/users/me").build());
        assert_eq!(recording.body_string(), "profile");
    }

    #[test]
    fn test_fallback_runs_global_middleware() {
        let log = Arc::new(Mutex::new(String::new()));
        let mut app = Harmony::new();
        app.use_middleware(append(&log, "g"));
        app.fallback(|ctx| ctx.send_status(StatusCode::IM_A_TEAPOT));

        let recording = serve(&app.build().unwrap(), TestRequest::get("/nowhere").build());
        assert_eq!(recording.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(*log.lock(), "g");
    }

    #[test]
    fn test_errors_reach_hook_without_rewriting_status() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut app = Harmony::new();
        app.get(
            "/",
            |ctx| {
                ctx.send_status(StatusCode::ACCEPTED)?;
                Err(HttpError::new(StatusCode::CONFLICT, "late").into())
            },
            &[],
        );
        let sink = seen.clone();
        app.on_error(move |_, err| sink.lock().push(err.to_string()));

        let recording = serve(&app.build().unwrap(), TestRequest::get("/").build());
        assert_eq!(recording.status(), StatusCode::ACCEPTED);
        assert_eq!(*seen.lock(), vec!["harmony: code=409, message=late"]);
    }

    #[test]
    fn test_contexts_are_reused_without_leaking() {
        let mut app = Harmony::new();
        app.get(
            "/set",
            |ctx| {
                ctx.set("secret", 1_u8);
                Ok(())
            },
            &[],
        );
        app.get(
            "/check",
            |ctx| {
                let leaked = ctx.get("secret").is_some();
                ctx.string(StatusCode::OK, if leaked { "leaked" } else { "clean" })
            },
            &[],
        );
        let dispatcher = app.build().unwrap();

        serve(&dispatcher, TestRequest::get("/set").build());
        assert_eq!(dispatcher.idle_contexts(), 1);
        let recording = serve(&dispatcher, TestRequest::get("/check").build());
        assert_eq!(recording.body_string(), "clean");
        assert_eq!(dispatcher.idle_contexts(), 1);
    }

    #[test]
    fn test_context_released_after_panic() {
        let mut app = Harmony::new();
        app.get("/boom", |_| panic!("boom"), &[]);
        let dispatcher = app.build().unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            serve(&dispatcher, TestRequest::get("/boom").build())
        }));
        assert!(result.is_err());
        assert_eq!(dispatcher.idle_contexts(), 1);
    }

    #[test]
    fn test_duplicate_route_fails_build() {
        let mut app = Harmony::new();
        app.get("/a", |_| Ok(()), &[]);
        app.get("/a", |_| Ok(()), &[]);
        assert!(matches!(app.build(), Err(Error::Route(_))));
    }
}
