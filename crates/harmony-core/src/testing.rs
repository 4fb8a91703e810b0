//! In-memory request and response helpers for tests.
//!
//! [`ResponseRecorder`] is a [`ResponseWriter`] that records what a handler
//! sent. It is moved into a context, so the results are read through a
//! [`Recording`] handle taken beforehand:
//!
//! ```
//! use harmony_core::testing::{ResponseRecorder, TestRequest};
//! use harmony_core::{Binder, Context};
//! use http::StatusCode;
//! use std::sync::Arc;
//!
//! let recorder = ResponseRecorder::new();
//! let recording = recorder.recording();
//! let mut ctx = Context::new(
//!     TestRequest::get("/ping").build(),
//!     Box::new(recorder),
//!     Arc::new(Binder::new()),
//! );
//!
//! ctx.string(StatusCode::OK, "pong").unwrap();
//! assert_eq!(recording.body_string(), "pong");
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use parking_lot::Mutex;
use tokio::io::DuplexStream;

use crate::error::Result;
use crate::request::Request;
use crate::writer::{Connection, Flush, Hijack, Hijacked, ResponseWriter};

const DUPLEX_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Recorded {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    flushes: usize,
    writes: usize,
    peer: Option<DuplexStream>,
    hijacked: bool,
}

/// Read side of a [`ResponseRecorder`].
#[derive(Debug, Clone, Default)]
pub struct Recording {
    inner: Arc<Mutex<Recorded>>,
}

impl Recording {
    /// Status written, or `200 OK` if none was.
    pub fn status(&self) -> StatusCode {
        self.inner.lock().status.unwrap_or(StatusCode::OK)
    }

    /// Status written, if any.
    pub fn written_status(&self) -> Option<StatusCode> {
        self.inner.lock().status
    }

    /// Headers as they were when the status was sent.
    pub fn headers(&self) -> HeaderMap {
        self.inner.lock().headers.clone()
    }

    /// One header value as a string.
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Body bytes written so far.
    pub fn body(&self) -> Vec<u8> {
        self.inner.lock().body.clone()
    }

    /// Body decoded as UTF-8, lossily.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().body).into_owned()
    }

    /// Number of `write` calls that reached the recorder.
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    /// Number of flushes.
    pub fn flushes(&self) -> usize {
        self.inner.lock().flushes
    }

    /// Returns true if the connection was hijacked.
    pub fn hijacked(&self) -> bool {
        self.inner.lock().hijacked
    }

    /// Client end of a hijacked connection.
    pub fn take_peer(&self) -> Option<DuplexStream> {
        self.inner.lock().peer.take()
    }
}

/// A [`ResponseWriter`] that records everything in memory.
///
/// Flush and hijack are off by default so tests can exercise writers that
/// lack them; enable them with [`with_flush`](Self::with_flush) and
/// [`with_hijack`](Self::with_hijack).
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    wrote_header: bool,
    flush: bool,
    hijack: bool,
    recording: Recording,
}

impl ResponseRecorder {
    /// Creates a recorder without optional capabilities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the flush capability.
    #[must_use]
    pub fn with_flush(mut self) -> Self {
        self.flush = true;
        self
    }

    /// Enables the hijack capability.
    #[must_use]
    pub fn with_hijack(mut self) -> Self {
        self.hijack = true;
        self
    }

    /// Handle for reading what gets recorded.
    pub fn recording(&self) -> Recording {
        self.recording.clone()
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.wrote_header {
            tracing::debug!(%status, "superfluous write_header call ignored");
            return;
        }
        self.wrote_header = true;
        let mut recorded = self.recording.inner.lock();
        recorded.status = Some(status);
        recorded.headers = self.headers.clone();
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.wrote_header {
            self.write_header(StatusCode::OK);
        }
        let mut recorded = self.recording.inner.lock();
        recorded.writes += 1;
        recorded.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        if self.flush {
            Some(self)
        } else {
            None
        }
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.hijack {
            Some(self)
        } else {
            None
        }
    }
}

impl Flush for ResponseRecorder {
    fn flush(&mut self) -> Result<()> {
        if !self.wrote_header {
            self.write_header(StatusCode::OK);
        }
        self.recording.inner.lock().flushes += 1;
        Ok(())
    }
}

impl Hijack for ResponseRecorder {
    fn hijack(&mut self) -> Result<Hijacked> {
        let (server, client) = tokio::io::duplex(DUPLEX_CAPACITY);
        {
            let mut recorded = self.recording.inner.lock();
            recorded.hijacked = true;
            recorded.peer = Some(client);
        }
        let conn: Box<dyn Connection> = Box::new(server);
        Ok(Box::pin(async move { Ok(conn) }))
    }
}

impl Drop for ResponseRecorder {
    fn drop(&mut self) {
        if !self.wrote_header {
            self.recording.inner.lock().headers = std::mem::take(&mut self.headers);
        }
    }
}

/// Builder for [`Request`] values in tests.
#[derive(Debug)]
pub struct TestRequest {
    request: Request,
}

impl TestRequest {
    /// Starts a request with the given method and target.
    pub fn new(method: Method, uri: &'static str) -> Self {
        Self {
            request: Request::new(method, Uri::from_static(uri)),
        }
    }

    /// Starts a `GET` request.
    pub fn get(uri: &'static str) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Starts a `POST` request.
    pub fn post(uri: &'static str) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.request.headers_mut().append(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request = self.request.with_body(body);
        self
    }

    /// Adds a path variable as if captured by the router.
    #[must_use]
    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.request.params_mut().push(name, value);
        self
    }

    /// Sets the peer address.
    #[must_use]
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.request = self.request.with_remote_addr(addr);
        self
    }

    /// Finishes the request.
    pub fn build(self) -> Request {
        self.request
    }
}
