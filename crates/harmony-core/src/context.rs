//! Per-request context.
//!
//! A [`Context`] bundles the request, the (possibly decorated) response
//! writer, a key/value side channel shared between middleware, and the
//! binder. Contexts are pooled by the dispatcher: [`Reset`] clears
//! everything except the binder, so nothing from one request is visible to
//! the next.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::{header, HeaderValue, StatusCode};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bind::{Bind, Binder, FromParam};
use crate::error::{Error, Result};
use crate::pool::Reset;
use crate::request::Request;
use crate::writer::{Detached, ResponseWriter};

/// `application/json; charset=utf-8`
pub const MIME_APPLICATION_JSON_CHARSET_UTF8: &str = "application/json; charset=utf-8";
/// `text/plain; charset=utf-8`
pub const MIME_TEXT_PLAIN_CHARSET_UTF8: &str = "text/plain; charset=utf-8";

/// A value stored in the side channel.
pub type Value = Arc<dyn Any + Send + Sync>;

/// The side channel of a [`Context`].
///
/// Cloning yields another handle to the same map, so work spawned by a
/// middleware can read and write it from another thread. A context that is
/// reset while such a handle is alive gets a fresh map; the old handle
/// keeps the old one.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl Store {
    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Returns the value under `key` if it has type `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).and_then(|v| v.downcast::<T>().ok())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.inner.write().insert(key.into(), Arc::new(value));
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().remove(key)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    fn clear(&mut self) {
        match Arc::get_mut(&mut self.inner) {
            Some(map) => map.get_mut().clear(),
            None => self.inner = Arc::default(),
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.read().keys()).finish()
    }
}

/// The per-request façade handed to handlers and middleware.
pub struct Context {
    request: Request,
    writer: Box<dyn ResponseWriter>,
    store: Store,
    binder: Arc<Binder>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::with_binder(Arc::new(Binder::default()))
    }
}

impl Reset for Context {
    fn reset(&mut self) {
        self.request = Request::default();
        self.writer = Box::new(Detached::default());
        self.store.clear();
    }
}

impl Context {
    /// Creates a detached context sharing `binder`.
    pub fn with_binder(binder: Arc<Binder>) -> Self {
        Self {
            request: Request::default(),
            writer: Box::new(Detached::default()),
            store: Store::default(),
            binder,
        }
    }

    /// Creates a context serving `request` through `writer`.
    pub fn new(request: Request, writer: Box<dyn ResponseWriter>, binder: Arc<Binder>) -> Self {
        let mut ctx = Self::with_binder(binder);
        ctx.attach(request, writer);
        ctx
    }

    /// Points a pooled context at a new request.
    pub fn attach(&mut self, request: Request, writer: Box<dyn ResponseWriter>) {
        self.request = request;
        self.writer = writer;
    }

    /// The inbound request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Mutable access to the inbound request.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The current response writer.
    pub fn response(&mut self) -> &mut dyn ResponseWriter {
        self.writer.as_mut()
    }

    /// Replaces the response writer, returning the previous one.
    pub fn set_response_writer(
        &mut self,
        writer: Box<dyn ResponseWriter>,
    ) -> Box<dyn ResponseWriter> {
        std::mem::replace(&mut self.writer, writer)
    }

    /// Takes the response writer out, leaving a detached placeholder.
    pub fn take_response_writer(&mut self) -> Box<dyn ResponseWriter> {
        self.set_response_writer(Box::new(Detached::default()))
    }

    /// Installs a decorator built from the current writer.
    pub fn wrap_response_writer<F>(&mut self, wrap: F) -> Result<()>
    where
        F: FnOnce(Box<dyn ResponseWriter>) -> Result<Box<dyn ResponseWriter>>,
    {
        let inner = self.take_response_writer();
        self.writer = wrap(inner)?;
        Ok(())
    }

    /// Removes the current writer if it is a `W`, leaving a placeholder.
    ///
    /// Returns `None`, and leaves the writer in place, when something
    /// downstream installed a different writer.
    pub fn unwrap_response_writer<W: ResponseWriter>(&mut self) -> Option<Box<W>> {
        if !(*self.writer).as_any().is::<W>() {
            return None;
        }
        self.take_response_writer().into_any().downcast::<W>().ok()
    }

    /// Handle to the side channel.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Returns the side-channel value under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }

    /// Returns the side-channel value under `key` if it has type `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.store.get_as(key)
    }

    /// Stores a side-channel value.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.store.set(key, value);
    }

    /// The shared binder.
    pub fn binder(&self) -> &Arc<Binder> {
        &self.binder
    }

    /// Binds the request into `dest`.
    pub fn bind<T: Bind>(&self, dest: &mut T) -> Result<()> {
        self.binder.bind(&self.request, dest)
    }

    /// Decodes the whole JSON body into a new `T`.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T> {
        self.binder.bind_json(&self.request)
    }

    /// Writes `body` as JSON, followed by a newline.
    pub fn json<T: Serialize + ?Sized>(&mut self, code: StatusCode, body: &T) -> Result<()> {
        let mut encoded = serde_json::to_vec(body).map_err(Error::Encode)?;
        encoded.push(b'\n');
        self.writer.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(MIME_APPLICATION_JSON_CHARSET_UTF8),
        );
        self.writer.write_header(code);
        self.writer.write_all(&encoded)
    }

    /// Writes `body` as plain text.
    pub fn string(&mut self, code: StatusCode, body: &str) -> Result<()> {
        self.writer.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(MIME_TEXT_PLAIN_CHARSET_UTF8),
        );
        self.writer.write_header(code);
        self.writer.write_all(body.as_bytes())
    }

    /// Writes only the status line.
    pub fn send_status(&mut self, code: StatusCode) -> Result<()> {
        self.writer.write_header(code);
        Ok(())
    }

    /// Path variables as `(name, value)` pairs.
    pub fn path_params(&self) -> &harmony_router::Params {
        self.request.params()
    }

    /// A path variable, or `""` when absent.
    pub fn path_param(&self, key: &str) -> &str {
        self.request.params().get(key).unwrap_or_default()
    }

    /// A path variable parsed as an integer.
    pub fn path_param_int(&self, key: &str) -> Result<i64> {
        let raw = self.path_param(key);
        i64::from_param(raw).map_err(|err| Error::TypeCoercion {
            field: "path",
            value: raw.to_string(),
            kind: err.kind,
            reason: err.reason,
        })
    }

    /// Adds a path variable unless one with that name already exists.
    pub fn set_path_param(&mut self, key: &str, value: impl Into<String>) {
        self.request.params_mut().insert_if_absent(key, value);
    }

    /// A query value, or `""` when absent.
    pub fn query_string(&self, key: &str) -> &str {
        self.request.query(key).unwrap_or_default()
    }

    /// A query value, or `default` when absent or empty.
    pub fn query_string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.request.query(key) {
            Some(v) if !v.is_empty() => v,
            _ => default,
        }
    }

    /// A query value parsed as `T`; `None` when absent or malformed.
    pub fn query_parse<T: FromParam>(&self, key: &str) -> Option<T> {
        self.request
            .query(key)
            .and_then(|raw| T::from_param(raw).ok())
    }

    /// A query value parsed as an integer.
    pub fn query_int(&self, key: &str) -> Option<i64> {
        self.query_parse(key)
    }

    /// A query integer, or `default` when absent or malformed.
    pub fn query_int_or(&self, key: &str, default: i64) -> i64 {
        self.query_int(key).unwrap_or(default)
    }

    /// A query value parsed as a float.
    pub fn query_float(&self, key: &str) -> Option<f64> {
        self.query_parse(key)
    }

    /// A query float, or `default` when absent or malformed.
    pub fn query_float_or(&self, key: &str, default: f64) -> f64 {
        self.query_float(key).unwrap_or(default)
    }

    /// A query value parsed as a boolean (`1`, `t`, `true`, `0`, `f`, `false`, ...).
    pub fn query_bool(&self, key: &str) -> Option<bool> {
        self.query_parse(key)
    }

    /// A query boolean, or `default` when absent or malformed.
    pub fn query_bool_or(&self, key: &str, default: bool) -> bool {
        self.query_bool(key).unwrap_or(default)
    }
}
