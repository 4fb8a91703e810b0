//! Handler and middleware function types.
//!
//! A [`Handler`] processes one request through a [`Context`]. A
//! [`Middleware`] turns a handler into another handler, usually one that
//! does some work, calls the wrapped handler and does some more.
//!
//! Chains follow the onion model: for middleware `[m1, m2, m3]` the
//! pre-handler code runs `m1, m2, m3` and the post-handler code runs
//! `m3, m2, m1`.

use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;

/// A request handler.
pub type Handler = Arc<dyn Fn(&mut Context) -> Result<()> + Send + Sync>;

/// A handler transformer.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Boxes a closure as a [`Handler`].
///
/// ```
/// use harmony_core::{handler, Context};
/// use http::StatusCode;
///
/// let hello = handler(|ctx: &mut Context| ctx.string(StatusCode::OK, "hello"));
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Boxes a closure as a [`Middleware`].
///
/// ```
/// use harmony_core::{handler, middleware, Context, Handler};
///
/// let tag = middleware(|next: Handler| {
///     handler(move |ctx: &mut Context| {
///         ctx.set("tagged", true);
///         next(ctx)
///     })
/// });
/// ```
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps `handler` in `middlewares` so that the first one is outermost.
pub fn chain(handler: Handler, middlewares: &[Middleware]) -> Handler {
    middlewares.iter().rev().fold(handler, |next, mw| mw(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Middleware {
        let log = log.clone();
        middleware(move |next| {
            let log = log.clone();
            handler(move |ctx| {
                log.lock().push(format!("{name}:before"));
                let result = next(ctx);
                log.lock().push(format!("{name}:after"));
                result
            })
        })
    }

    #[test]
    fn test_chain_is_an_onion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = log.clone();
        let h = handler(move |_| {
            inner.lock().push("handler".to_string());
            Ok(())
        });

        let wrapped = chain(
            h,
            &[
                recording(&log, "m1"),
                recording(&log, "m2"),
                recording(&log, "m3"),
            ],
        );
        wrapped(&mut Context::default()).unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "m1:before",
                "m2:before",
                "m3:before",
                "handler",
                "m3:after",
                "m2:after",
                "m1:after",
            ]
        );
    }

    #[test]
    fn test_middleware_can_short_circuit() {
        let stop = middleware(|_next| {
            handler(|_| Err(crate::HttpError::from_status(http::StatusCode::UNAUTHORIZED).into()))
        });
        let h = handler(|_| panic!("handler must not run"));

        let err = chain(h, &[stop])(&mut Context::default()).unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let h = handler(|ctx| {
            ctx.set("ran", true);
            Ok(())
        });
        let mut ctx = Context::default();
        chain(h, &[])(&mut ctx).unwrap();
        assert!(ctx.get("ran").is_some());
    }
}
