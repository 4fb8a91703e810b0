//! Access logging.
//!
//! The middleware wraps the response writer to observe the status code and
//! the time until the head was written, then emits one line per request
//! on the `harmony::access` tracing target. The line is rendered from a
//! template parsed once when the middleware is built.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use harmony_core::writer::{self, Flush, Hijack, Hijacked, ResponseWriter};
use harmony_core::{handler, middleware, Context, Middleware, Request, Result};
use http::{HeaderMap, Method, StatusCode};

use crate::skipper::{default_skipper, Skipper};

/// Template used when none is configured.
pub const DEFAULT_LOGGER_FORMAT: &str =
    r#"{remote_ip} - {host} "{method} {path} {protocol}" {status} {latency}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    RemoteIp,
    Host,
    Method,
    Path,
    Protocol,
    Status,
    Latency,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "remote_ip" => Self::RemoteIp,
            "host" => Self::Host,
            "method" => Self::Method,
            "path" => Self::Path,
            "protocol" => Self::Protocol,
            "status" => Self::Status,
            "latency" => Self::Latency,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed access-log template.
///
/// Recognised placeholders are `{remote_ip}`, `{host}`, `{method}`,
/// `{path}`, `{protocol}`, `{status}` and `{latency}`. Anything else,
/// including unknown placeholders, is copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parses `format`.
    pub fn parse(format: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = format;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let tail = &rest[open..];
            let field = tail
                .find('}')
                .and_then(|close| Field::from_name(&tail[1..close]).map(|f| (f, close)));
            match field {
                Some((field, close)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                    rest = &tail[close + 1..];
                }
                None => {
                    literal.push('{');
                    rest = &tail[1..];
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    /// Renders one line for `entry`.
    pub fn render(&self, entry: &AccessEntry<'_>) -> String {
        let mut line = String::with_capacity(128);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => line.push_str(text),
                Segment::Field(Field::RemoteIp) => match entry.remote_addr {
                    Some(addr) => line.push_str(&addr.ip().to_string()),
                    None => line.push('-'),
                },
                Segment::Field(Field::Host) => line.push_str(entry.host),
                Segment::Field(Field::Method) => line.push_str(entry.method.as_str()),
                Segment::Field(Field::Path) => line.push_str(entry.path),
                Segment::Field(Field::Protocol) => line.push_str(&entry.protocol),
                Segment::Field(Field::Status) => line.push_str(entry.status.as_str()),
                Segment::Field(Field::Latency) => line.push_str(&format!("{:?}", entry.latency)),
            }
        }
        line
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::parse(DEFAULT_LOGGER_FORMAT)
    }
}

/// Values available to a [`Template`].
#[derive(Debug, Clone)]
pub struct AccessEntry<'a> {
    /// Peer address, if the transport knows it.
    pub remote_addr: Option<SocketAddr>,
    /// `Host` header or URI authority.
    pub host: &'a str,
    /// Request method.
    pub method: &'a Method,
    /// Request path.
    pub path: &'a str,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub protocol: String,
    /// Final status code.
    pub status: StatusCode,
    /// Time until the response head was written.
    pub latency: Duration,
}

impl<'a> AccessEntry<'a> {
    /// Builds an entry from a request and the observed outcome.
    pub fn new(request: &'a Request, status: StatusCode, latency: Duration) -> Self {
        Self {
            remote_addr: request.remote_addr(),
            host: request.host(),
            method: request.method(),
            path: request.path(),
            protocol: request.protocol(),
            status,
            latency,
        }
    }
}

/// Logger middleware configuration.
#[derive(Clone)]
pub struct LoggerConfig {
    /// Line template.
    pub format: String,
    /// Requests that are not logged.
    pub skipper: Skipper,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOGGER_FORMAT.to_string(),
            skipper: default_skipper(),
        }
    }
}

impl fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Entry point for building the logger middleware.
#[derive(Debug, Clone, Copy)]
pub struct Logger;

impl Logger {
    /// Starts a builder with the default template.
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }
}

/// Builder for the logger middleware.
#[derive(Debug, Default, Clone)]
pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    /// Sets the line template.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.config.format = format.into();
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
        logger_with_config(self.config)
    }
}

/// Logger middleware with the default template.
pub fn logger() -> Middleware {
    logger_with_config(LoggerConfig::default())
}

/// Logger middleware with the given settings.
pub fn logger_with_config(config: LoggerConfig) -> Middleware {
    let template = Arc::new(Template::parse(&config.format));
    let skipper = config.skipper;

    middleware(move |next| {
        let template = template.clone();
        let skipper = skipper.clone();
        handler(move |ctx| {
            if skipper(ctx) {
                return next(ctx);
            }

            let started = Instant::now();
            ctx.wrap_response_writer(|inner| {
                let wrapped: Box<dyn ResponseWriter> = Box::new(LoggerResponseWriter::new(inner));
                Ok(wrapped)
            })?;
            let result = next(ctx);

            let (status, latency) = match ctx.unwrap_response_writer::<LoggerResponseWriter>() {
                Some(writer) => {
                    let observed = (writer.status(), writer.latency());
                    ctx.set_response_writer(writer.into_inner());
                    observed
                }
                None => {
                    tracing::debug!(
                        path = ctx.request().path(),
                        "response writer replaced downstream, status not observed"
                    );
                    (StatusCode::OK, started.elapsed())
                }
            };

            let line = template.render(&AccessEntry::new(ctx.request(), status, latency));
            tracing::info!(
                target: "harmony::access",
                status = status.as_u16(),
                latency = ?latency,
                "{line}"
            );
            result
        })
    })
}

/// The response writer installed by the logger middleware.
///
/// Observes the first status written and the time it took; body bytes
/// pass through untouched.
pub struct LoggerResponseWriter {
    inner: Box<dyn ResponseWriter>,
    started: Instant,
    status: Option<StatusCode>,
    latency: Option<Duration>,
}

impl fmt::Debug for LoggerResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerResponseWriter")
            .field("status", &self.status)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl LoggerResponseWriter {
    /// Wraps `inner`; latency is measured from now.
    pub fn new(inner: Box<dyn ResponseWriter>) -> Self {
        Self {
            inner,
            started: Instant::now(),
            status: None,
            latency: None,
        }
    }

    /// The first status written, `200 OK` if none was.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Time until the head was written, or until now if it has not been.
    pub fn latency(&self) -> Duration {
        self.latency.unwrap_or_else(|| self.started.elapsed())
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self: Box<Self>) -> Box<dyn ResponseWriter> {
        self.inner
    }

    fn observe(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
            self.latency = Some(self.started.elapsed());
        }
    }
}

impl ResponseWriter for LoggerResponseWriter {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.observe(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.observe(StatusCode::OK);
        self.inner.write(buf)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        if self.inner.flusher().is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.inner.hijacker().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl Flush for LoggerResponseWriter {
    fn flush(&mut self) -> Result<()> {
        self.observe(StatusCode::OK);
        writer::flush(self.inner.as_mut())
    }
}

impl Hijack for LoggerResponseWriter {
    fn hijack(&mut self) -> Result<Hijacked> {
        writer::hijack(self.inner.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmony_core::testing::{ResponseRecorder, TestRequest};
    use harmony_core::{Error, Harmony};
    use parking_lot::Mutex;
    use std::io;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn captured<R>(f: impl FnOnce() -> R) -> (R, Capture) {
        let capture = Capture::default();
        let sink = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        (out, capture)
    }

    fn entry<'a>(request: &'a Request) -> AccessEntry<'a> {
        AccessEntry::new(request, StatusCode::CREATED, Duration::from_millis(3))
    }

    #[test]
    fn test_default_template() {
        let request = TestRequest::get("/users/7")
            .header("host", "example.com")
            .remote_addr("192.0.2.1:50000".parse().unwrap())
            .build();
        let line = Template::default().render(&entry(&request));
        assert_eq!(
            line,
            r#"192.0.2.1 - example.com "GET /users/7 HTTP/1.1" 201 3ms"#
        );
    }

    #[test]
    fn test_unknown_placeholders_are_verbatim() {
        let request = TestRequest::get("/").build();
        let template = Template::parse("{method} {user_agent} {{status} {path");
        assert_eq!(template.render(&entry(&request)), "GET {user_agent} {201 {path");
    }

    #[test]
    fn test_missing_remote_address_renders_dash() {
        let request = TestRequest::get("/").build();
        let template = Template::parse("[{remote_ip}]");
        assert_eq!(template.render(&entry(&request)), "[-]");
    }

    #[test]
    fn test_writer_records_first_status_only() {
        let recorder = ResponseRecorder::new();
        let recording = recorder.recording();
        let mut writer = LoggerResponseWriter::new(Box::new(recorder));

        writer.write_header(StatusCode::ACCEPTED);
        let latency = writer.latency();
        writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        writer.write_all(b"body").unwrap();

        assert_eq!(writer.status(), StatusCode::ACCEPTED);
        assert_eq!(writer.latency(), latency);
        assert_eq!(recording.status(), StatusCode::ACCEPTED);
        assert_eq!(recording.body(), b"body");
    }

    #[test]
    fn test_writer_implicit_ok_on_write() {
        let mut writer = LoggerResponseWriter::new(Box::new(ResponseRecorder::new()));
        assert_eq!(writer.status(), StatusCode::OK);
        writer.write_all(b"x").unwrap();
        assert_eq!(writer.status(), StatusCode::OK);
        assert!(writer.latency.is_some());
    }

    #[test]
    fn test_capabilities_follow_inner_writer() {
        let mut plain = LoggerResponseWriter::new(Box::new(ResponseRecorder::new()));
        assert!(matches!(
            writer::flush(&mut plain),
            Err(Error::UnsupportedOperation { operation: "flush" })
        ));
        assert!(writer::hijack(&mut plain).is_err());

        let recorder = ResponseRecorder::new().with_flush();
        let recording = recorder.recording();
        let mut flushing = LoggerResponseWriter::new(Box::new(recorder));
        writer::flush(&mut flushing).unwrap();
        assert_eq!(recording.flushes(), 1);
    }

    #[test]
    fn test_middleware_logs_each_request() {
        let mut app = Harmony::new();
        app.use_middleware(logger());
        app.get(
            "/users/{id}",
            |ctx| {
                let id = ctx.path_param("id").to_string();
                ctx.string(StatusCode::CREATED, &id)
            },
            &[],
        );
        let dispatcher = app.build().unwrap();

        let ((), capture) = captured(|| {
            for path in ["/users/1", "/users/2"] {
                let request = TestRequest::get(path)
                    .header("host", "example.com")
                    .remote_addr("192.0.2.1:4000".parse().unwrap())
                    .build();
                dispatcher
                    .serve(request, Box::new(ResponseRecorder::new()))
                    .unwrap();
            }
        });

        let lines = capture.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("harmony::access"));
        assert!(lines[0].contains(r#"192.0.2.1 - example.com "GET /users/1 HTTP/1.1" 201 "#));
        assert!(lines[1].contains(r#""GET /users/2 HTTP/1.1" 201 "#));
    }

    #[test]
    fn test_middleware_does_not_alter_response() {
        let recorder = ResponseRecorder::new();
        let recording = recorder.recording();
        let mut app = Harmony::new();
        app.use_middleware(logger());
        app.get("/", |ctx| ctx.json(StatusCode::OK, &[1, 2, 3]), &[]);
        app.build()
            .unwrap()
            .serve(TestRequest::get("/").build(), Box::new(recorder))
            .unwrap();

        assert_eq!(recording.body_string(), "[1,2,3]\n");
        assert_eq!(
            recording.header("content-type").as_deref(),
            Some("application/json; charset=utf-8")
        );
    }

    #[test]
    fn test_skipper_suppresses_line() {
        let mut app = Harmony::new();
        app.use_middleware(Logger::builder().skipper(|_| true).build());
        app.get("/", |ctx| ctx.send_status(StatusCode::OK), &[]);
        let dispatcher = app.build().unwrap();

        let ((), capture) = captured(|| {
            dispatcher
                .serve(TestRequest::get("/").build(), Box::new(ResponseRecorder::new()))
                .unwrap();
        });
        assert!(capture
            .lines()
            .iter()
            .all(|line| !line.contains("harmony::access")));
    }

    #[test]
    fn test_handler_error_is_propagated_and_logged() {
        let errors = Arc::new(Mutex::new(0));
        let seen = errors.clone();

        let mut app = Harmony::new();
        app.use_middleware(Logger::builder().format("{method} {status}").build());
        app.get(
            "/",
            |ctx| {
                ctx.send_status(StatusCode::CONFLICT)?;
                Err(Error::internal("conflict"))
            },
            &[],
        );
        app.on_error(move |_, _| *seen.lock() += 1);
        let dispatcher = app.build().unwrap();

        let ((), capture) = captured(|| {
            dispatcher
                .serve(TestRequest::get("/").build(), Box::new(ResponseRecorder::new()))
                .unwrap();
        });

        assert_eq!(*errors.lock(), 1);
        assert!(capture.lines().iter().any(|line| line.contains("GET 409")));
    }

    #[test]
    fn test_line_is_logged_when_writer_is_replaced_downstream() {
        let mut app = Harmony::new();
        app.use_middleware(Logger::builder().format("{method} {path} {status}").build());
        app.use_middleware(middleware(|next| {
            handler(move |ctx| {
                let _ = ctx.set_response_writer(Box::new(ResponseRecorder::new()));
                next(ctx)
            })
        }));
        app.get("/swap", |ctx| ctx.send_status(StatusCode::ACCEPTED), &[]);
        let dispatcher = app.build().unwrap();

        let ((), capture) = captured(|| {
            dispatcher
                .serve(TestRequest::get("/swap").build(), Box::new(ResponseRecorder::new()))
                .unwrap();
        });

        let lines = capture.lines();
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("GET /swap 200"), "{}", lines[0]);
    }
}
