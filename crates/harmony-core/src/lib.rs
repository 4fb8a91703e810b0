//! # Harmony Core
//!
//! The per-request pipeline of the Harmony framework:
//!
//! - [`Context`] - pooled per-request façade over request, writer and side channel
//! - [`Handler`] / [`Middleware`] - the handler chain and its onion-style composition
//! - [`Binder`] / [`Bind`] - descriptor-driven binding of path, query and body values
//! - [`ResponseWriter`] - the writer contract decorators implement
//! - [`Harmony`] / [`Group`] / [`Dispatcher`] - route registration and dispatch
//! - [`Pool`] - explicit acquire/release object pools
//!
//! Transport is not part of this crate; `harmony-server` adapts hyper to
//! [`Dispatcher::serve`].

#![doc(html_root_url = "https://docs.rs/harmony-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

extern crate self as harmony_core;

macro_rules! route_methods {
    ($ty:ty) => {
        route_methods!(@impl $ty;
            get => GET,
            post => POST,
            put => PUT,
            patch => PATCH,
            delete => DELETE,
            connect => CONNECT,
            options => OPTIONS,
            head => HEAD,
            trace => TRACE,
        );
    };
    (@impl $ty:ty; $($name:ident => $method:ident,)*) => {
        impl $ty {
            $(
                #[doc = concat!("Registers a `", stringify!($method), "` route.")]
                pub fn $name<F>(
                    &mut self,
                    path: &str,
                    handler: F,
                    middlewares: &[$crate::handler::Middleware],
                ) -> &mut Self
                where
                    F: Fn(&mut $crate::context::Context) -> $crate::error::Result<()>
                        + Send
                        + Sync
                        + 'static,
                {
                    self.add(::http::Method::$method, path, handler, middlewares)
                }
            )*
        }
    };
}

pub mod bind;
mod context;
mod dispatch;
mod error;
mod group;
mod handler;
pub mod pool;
mod request;
pub mod testing;
pub mod writer;

pub use bind::{Bind, Binder, Descriptor, FromParam};
pub use context::{
    Context, Store, Value, MIME_APPLICATION_JSON_CHARSET_UTF8, MIME_TEXT_PLAIN_CHARSET_UTF8,
};
pub use dispatch::{Dispatcher, ErrorHook, Harmony, ALLOWED_METHODS_KEY};
pub use error::{Error, HttpError, Result};
pub use group::Group;
pub use handler::{chain, handler, middleware, Handler, Middleware};
pub use harmony_macros::Bind;
pub use harmony_router::Params;
pub use pool::{Pool, Pooled, Reset};
pub use request::Request;
pub use writer::{Connection, Detached, Flush, Hijack, Hijacked, IntoAny, ResponseWriter};
