//! Gzip response compression.
//!
//! The decorator defers the response head until it knows whether the body
//! is worth compressing:
//!
//! - the status passed to `write_header` is cached, not forwarded
//! - body bytes are buffered until `min_length` is reached, at which point
//!   the decorator commits: `Content-Encoding: gzip` is set, the head is
//!   forwarded and the buffer is drained through the compressor
//! - an explicit flush commits immediately, whatever the buffered length
//! - a response that never reaches the threshold is written verbatim when
//!   the decorator closes
//!
//! Compressors and buffers are recycled through [`Pool`]s owned by the
//! middleware instance.
//!
//! ## Example
//!
//! ```
//! use harmony_core::Harmony;
//! use harmony_middleware::gzip::Gzip;
//!
//! let mut app = Harmony::new();
//! app.use_middleware(Gzip::builder().level(5).min_length(256).build());
//! ```

use std::fmt;
use std::io::{self, Write as _};
use std::sync::Arc;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use harmony_core::pool::{Pool, Reset};
use harmony_core::writer::{self, Detached, Flush, Hijack, Hijacked, ResponseWriter};
use harmony_core::{handler, middleware, Context, Error, Middleware, Result};
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::skipper::{default_skipper, Skipper};
use crate::sniff::detect_content_type;

const GZIP: &str = "gzip";

/// RFC 1952 member header: deflate, no flags, no mtime, unknown OS.
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff];

/// Level selecting the compressor's default trade-off.
pub const DEFAULT_COMPRESSION: i32 = -1;

/// Maps a gzip level (`-1` or `0..=9`) to a [`Compression`]. Huffman-only
/// (`-2`) has no `flate2` equivalent and is rejected.
pub fn compression_level(level: i32) -> Result<Compression> {
    match level {
        DEFAULT_COMPRESSION => Ok(Compression::default()),
        0..=9 => Ok(Compression::new(level.unsigned_abs())),
        other => Err(Error::internal(format!(
            "invalid gzip compression level {other}, expected -1..=9"
        ))),
    }
}

/// Gzip middleware configuration.
#[derive(Clone)]
pub struct GzipConfig {
    /// Compression level, `-1` for the default or `0..=9`.
    pub level: i32,
    /// Body length at which the response is compressed.
    pub min_length: usize,
    /// Requests for which the middleware is a pass-through.
    pub skipper: Skipper,
}

impl Default for GzipConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION,
            min_length: 0,
            skipper: default_skipper(),
        }
    }
}

impl fmt::Debug for GzipConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipConfig")
            .field("level", &self.level)
            .field("min_length", &self.min_length)
            .finish_non_exhaustive()
    }
}

/// Entry point for building the gzip middleware.
#[derive(Debug, Clone, Copy)]
pub struct Gzip;

impl Gzip {
    /// Starts a builder with default settings.
    pub fn builder() -> GzipBuilder {
        GzipBuilder::default()
    }
}

/// Builder for the gzip middleware.
#[derive(Debug, Default, Clone)]
pub struct GzipBuilder {
    config: GzipConfig,
}

impl GzipBuilder {
    /// Sets the compression level. Out-of-range levels surface as
    /// [`Error::Internal`] on the first compressed request.
    pub fn level(mut self, level: i32) -> Self {
        self.config.level = level;
        self
    }

    /// Sets the compression threshold in bytes.
    pub fn min_length(mut self, min_length: usize) -> Self {
        self.config.min_length = min_length;
        self
    }

    /// Sets the skip predicate.
    pub fn skipper<F>(mut self, skip: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.config.skipper = Arc::new(skip);
        self
    }

    /// Builds the middleware.
    pub fn build(self) -> Middleware {
        gzip_with_config(self.config)
    }
}

/// Gzip middleware with default settings.
pub fn gzip() -> Middleware {
    gzip_with_config(GzipConfig::default())
}

/// Gzip middleware with the given settings.
pub fn gzip_with_config(config: GzipConfig) -> Middleware {
    let GzipConfig {
        level,
        min_length,
        skipper,
    } = config;

    let shared = Arc::new(Shared {
        deflaters: Pool::with_factory(move || {
            let level = compression_level(level)?;
            Ok(Deflater(DeflateEncoder::new(Vec::new(), level)))
        }),
        buffers: Pool::new(Vec::new),
        min_length,
    });

    middleware(move |next| {
        let shared = shared.clone();
        let skipper = skipper.clone();
        handler(move |ctx| {
            if skipper(ctx) {
                return next(ctx);
            }
            ctx.response()
                .headers_mut()
                .append(VARY, HeaderValue::from_static("Accept-Encoding"));
            if !accepts_gzip(ctx.request().headers()) {
                return next(ctx);
            }

            let deflater = shared.deflaters.acquire()?;
            let buffer = shared.buffers.acquire()?;
            let pools = shared.clone();
            ctx.wrap_response_writer(move |inner| {
                let wrapped: Box<dyn ResponseWriter> =
                    Box::new(GzipResponseWriter::new(inner, pools, deflater, buffer));
                Ok(wrapped)
            })?;

            let result = next(ctx);

            // A writer installed further down that was never unwrapped still
            // holds ours; its drop closes the stream.
            let closed = match ctx.unwrap_response_writer::<GzipResponseWriter>() {
                Some(writer) => {
                    let (inner, closed) = writer.finish();
                    ctx.set_response_writer(inner);
                    closed
                }
                None => Ok(()),
            };
            result.and(closed)
        })
    })
}

/// Parses an `Accept-Encoding` value into codings and quality values,
/// highest quality first.
pub fn parse_accept_encoding(header_value: &str) -> Vec<(&str, f32)> {
    let mut encodings = Vec::new();

    for part in header_value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let mut params = part.split(';');
        let coding = params.next().unwrap_or_default().trim();
        let mut quality = 1.0f32;
        for param in params {
            if let Some(q) = param.trim().strip_prefix("q=") {
                if let Ok(q) = q.trim().parse::<f32>() {
                    quality = q.clamp(0.0, 1.0);
                }
            }
        }
        if !coding.is_empty() {
            encodings.push((coding, quality));
        }
    }

    encodings.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    encodings
}

/// Whether the request allows a gzip response. A request without
/// `Accept-Encoding` accepts any coding.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    let mut values = headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .peekable();
    if values.peek().is_none() {
        return true;
    }

    let mut wildcard = None;
    for (coding, quality) in values.flat_map(parse_accept_encoding) {
        if coding.eq_ignore_ascii_case(GZIP) || coding.eq_ignore_ascii_case("x-gzip") {
            return quality > 0.0;
        }
        if coding == "*" && wildcard.is_none() {
            wildcard = Some(quality);
        }
    }
    wildcard.is_some_and(|q| q > 0.0)
}

struct Shared {
    deflaters: Pool<Deflater>,
    buffers: Pool<Vec<u8>>,
    min_length: usize,
}

struct Deflater(DeflateEncoder<Vec<u8>>);

impl Reset for Deflater {
    fn reset(&mut self) {
        // flate2 finishes the old stream into the discarded buffer.
        if let Err(err) = self.0.reset(Vec::new()) {
            tracing::debug!(error = %err, "discarding unfinished deflate stream");
        }
    }
}

/// The response writer installed by the gzip middleware.
pub struct GzipResponseWriter {
    inner: Box<dyn ResponseWriter>,
    shared: Arc<Shared>,
    deflater: Option<Deflater>,
    buffer: Vec<u8>,
    crc: Crc,
    status: Option<StatusCode>,
    wrote_body: bool,
    committed: bool,
    hijacked: bool,
    closed: bool,
}

impl fmt::Debug for GzipResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipResponseWriter")
            .field("status", &self.status)
            .field("buffered", &self.buffer.len())
            .field("committed", &self.committed)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl GzipResponseWriter {
    fn new(
        inner: Box<dyn ResponseWriter>,
        shared: Arc<Shared>,
        deflater: Deflater,
        buffer: Vec<u8>,
    ) -> Self {
        Self {
            inner,
            shared,
            deflater: Some(deflater),
            buffer,
            crc: Crc::new(),
            status: None,
            wrote_body: false,
            committed: false,
            hijacked: false,
            closed: false,
        }
    }

    /// Whether the response is being compressed.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Ends the response and returns the pooled compressor and buffer.
    ///
    /// A committed stream gets its final deflate block and gzip trailer.
    /// Otherwise any cached status and buffered bytes are forwarded
    /// uncompressed and a stale `Content-Encoding: gzip` is removed.
    /// Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.finish_stream();
        self.release();
        result
    }

    /// Closes the decorator and hands back the writer it wrapped.
    pub fn finish(mut self: Box<Self>) -> (Box<dyn ResponseWriter>, Result<()>) {
        let closed = self.close();
        let inner = std::mem::replace(&mut self.inner, Box::new(Detached::default()));
        (inner, closed)
    }

    fn commit(&mut self) -> Result<()> {
        self.committed = true;
        let status = *self.status.get_or_insert(StatusCode::OK);

        let headers = self.inner.headers_mut();
        headers.remove(CONTENT_LENGTH);
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(GZIP));
        self.inner.write_header(status);
        self.inner.write_all(&GZIP_HEADER)?;

        let pending = std::mem::take(&mut self.buffer);
        let result = self.compress(&pending);
        self.buffer = pending;
        self.buffer.clear();
        result
    }

    fn compress(&mut self, data: &[u8]) -> Result<()> {
        self.crc.update(data);
        let Some(deflater) = self.deflater.as_mut() else {
            return Err(released());
        };
        deflater.0.write_all(data)?;
        drain(&mut deflater.0, self.inner.as_mut())
    }

    fn finish_stream(&mut self) -> Result<()> {
        if self.hijacked {
            return Ok(());
        }

        if self.committed {
            let Some(deflater) = self.deflater.as_mut() else {
                return Err(released());
            };
            deflater.0.try_finish()?;
            drain(&mut deflater.0, self.inner.as_mut())?;

            let mut trailer = [0u8; 8];
            trailer[..4].copy_from_slice(&self.crc.sum().to_le_bytes());
            trailer[4..].copy_from_slice(&self.crc.amount().to_le_bytes());
            return self.inner.write_all(&trailer);
        }

        let headers = self.inner.headers_mut();
        if headers.get(CONTENT_ENCODING).is_some_and(|v| v == GZIP) {
            headers.remove(CONTENT_ENCODING);
        }
        if let Some(status) = self.status {
            self.inner.write_header(status);
        }
        if self.wrote_body && !self.buffer.is_empty() {
            self.inner.write_all(&self.buffer)?;
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(deflater) = self.deflater.take() {
            self.shared.deflaters.release(deflater);
        }
        self.shared.buffers.release(std::mem::take(&mut self.buffer));
    }
}

fn drain(encoder: &mut DeflateEncoder<Vec<u8>>, inner: &mut dyn ResponseWriter) -> Result<()> {
    let out = encoder.get_mut();
    if out.is_empty() {
        return Ok(());
    }
    let result = inner.write_all(out);
    out.clear();
    result
}

fn released() -> Error {
    Error::internal("gzip compressor used after close")
}

impl ResponseWriter for GzipResponseWriter {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_some() {
            tracing::debug!(%status, "superfluous write_header call ignored");
            return;
        }
        self.inner.headers_mut().remove(CONTENT_LENGTH);
        self.status = Some(status);
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed || self.hijacked {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write on a closed gzip response",
            )));
        }

        if !self.wrote_body {
            self.wrote_body = true;
            if !self.inner.headers().contains_key(CONTENT_TYPE) {
                self.inner.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(detect_content_type(buf)),
                );
            }
        }

        if self.committed {
            self.compress(buf)?;
            return Ok(buf.len());
        }

        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= self.shared.min_length {
            self.commit()?;
        }
        Ok(buf.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        Some(self)
    }
}

impl Flush for GzipResponseWriter {
    fn flush(&mut self) -> Result<()> {
        if self.closed || self.hijacked {
            return Ok(());
        }
        if !self.committed {
            self.commit()?;
        }

        let Some(deflater) = self.deflater.as_mut() else {
            return Err(released());
        };
        deflater.0.flush()?;
        drain(&mut deflater.0, self.inner.as_mut())?;

        match self.inner.flusher() {
            Some(flusher) => flusher.flush(),
            None => Ok(()),
        }
    }
}

impl Hijack for GzipResponseWriter {
    fn hijack(&mut self) -> Result<Hijacked> {
        let conn = writer::hijack(self.inner.as_mut())?;
        self.hijacked = true;
        Ok(conn)
    }
}

impl Drop for GzipResponseWriter {
    fn drop(&mut self) {
        // A panicking handler must not commit a half-written body as a success.
        if std::thread::panicking() {
            self.closed = true;
            self.release();
            return;
        }
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to close gzip response");
        }
    }
}
