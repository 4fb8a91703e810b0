//! HTTP/1.1 server built on hyper and tokio.
//!
//! Each connection is served by hyper. For every request the adapter
//! collects the body (bounded by `max_body_bytes`), converts it into a
//! [`harmony_core::Request`] and runs [`Dispatcher::serve`] on the blocking
//! pool with a [`HyperResponseWriter`]. The response head is awaited and
//! the body streams to the client while the handler is still writing.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use harmony_core::{Dispatcher, Request};
use http::{Method, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::shutdown::{os_signal, ConnectionTracker, ShutdownSignal};
use crate::writer::{Chunk, Head, HyperResponseWriter, BODY_CHANNEL_CAPACITY};

/// Body type of every response the server produces.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

struct Shared {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

/// Serves a [`Dispatcher`] over TCP.
///
/// ```rust,no_run
/// use harmony_core::{Context, Harmony};
/// use harmony_server::{Server, ServerConfig};
/// use http::StatusCode;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mut app = Harmony::new();
/// app.get("/ping", |ctx: &mut Context| ctx.string(StatusCode::OK, "pong"), &[]);
///
/// let config = ServerConfig::builder().http_addr("127.0.0.1:8080").build();
/// Server::new(config, app.build()?).run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.shared.config)
            .field("local_addr", &self.local_addr)
            .field("active_connections", &self.tracker.active_connections())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a stopped server.
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                dispatcher: Arc::new(dispatcher),
            }),
            shutdown: ShutdownSignal::new(),
            tracker: ConnectionTracker::new(),
            task: None,
            local_addr: None,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of open client connections.
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections()
    }

    /// Binds the listener and starts accepting connections in the
    /// background. Returns the bound address, which differs from the
    /// configured one when port `0` was requested.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.task.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let config = &self.shared.config;
        let addr = config
            .socket_addr()
            .map_err(|source| ServerError::InvalidAddress {
                addr: config.http_addr().to_string(),
                source,
            })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        self.shutdown = ShutdownSignal::new();
        self.task = Some(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.shared),
            self.shutdown.clone(),
            self.tracker.clone(),
        )));
        self.local_addr = Some(local_addr);

        tracing::info!(addr = %local_addr, "server listening");
        Ok(local_addr)
    }

    /// Stops accepting, asks open connections to finish their current
    /// request, and waits for them up to `deadline`.
    pub async fn shutdown(&mut self, deadline: Duration) -> Result<(), ServerError> {
        let task = self.task.take().ok_or(ServerError::NotRunning)?;
        self.local_addr = None;
        self.shutdown.trigger();
        task.await?;

        tracing::info!(
            active = self.tracker.active_connections(),
            ?deadline,
            "waiting for connections to close"
        );
        if tokio::time::timeout(deadline, self.tracker.wait_for_shutdown())
            .await
            .is_err()
        {
            let active = self.tracker.active_connections();
            tracing::warn!(active, "shutdown deadline exceeded");
            return Err(ServerError::ShutdownTimeout { active });
        }

        tracing::info!("server stopped");
        Ok(())
    }

    /// Starts the server and shuts it down when `signal` completes, using
    /// the configured shutdown timeout.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        let deadline = self.shared.config.shutdown_timeout();
        self.shutdown(deadline).await
    }

    /// Runs until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(os_signal()).await
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    let token = tracker.acquire();
                    let shared = Arc::clone(&shared);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, remote_addr, shared, shutdown).await {
                            tracing::debug!(%remote_addr, error = %err, "connection error");
                        }
                        drop(token);
                    });
                }
                Err(err) => tracing::error!(error = %err, "failed to accept connection"),
            },
            () = shutdown.recv() => break,
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let idle_timeout = shared.config.idle_timeout();
    let service = service_fn(move |request: http::Request<Incoming>| {
        let shared = Arc::clone(&shared);
        async move { Ok::<_, Infallible>(handle(shared, request, remote_addr).await) }
    });

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(idle_timeout)
        .keep_alive(true);
    let conn = builder
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

async fn handle(
    shared: Arc<Shared>,
    mut request: http::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Response<ResponseBody> {
    let config = &shared.config;
    let upgrade = hyper::upgrade::on(&mut request);
    let (parts, body) = request.into_parts();

    let limited = Limited::new(body, config.max_body_bytes());
    let body = match tokio::time::timeout(config.read_timeout(), limited.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(err)) if err.downcast_ref::<LengthLimitError>().is_some() => {
            return plain(StatusCode::PAYLOAD_TOO_LARGE);
        }
        Ok(Err(err)) => {
            tracing::debug!(%remote_addr, error = %err, "failed to read request body");
            return plain(StatusCode::BAD_REQUEST);
        }
        Err(_) => return plain(StatusCode::REQUEST_TIMEOUT),
    };

    let request = Request::from_http(http::Request::from_parts(parts, body))
        .with_remote_addr(remote_addr);
    let method = request.method().clone();
    let path = request.path().to_string();

    let (head_tx, head_rx) = oneshot::channel::<Head>();
    let (body_tx, body_rx) = mpsc::channel::<Chunk>(BODY_CHANNEL_CAPACITY);
    let writer = HyperResponseWriter::new(head_tx, body_tx, Some(upgrade));

    let dispatcher = Arc::clone(&shared.dispatcher);
    let task = tokio::task::spawn_blocking(move || dispatcher.serve(request, Box::new(writer)));

    match tokio::time::timeout(config.write_timeout(), head_rx).await {
        Ok(Ok(head)) => {
            tokio::spawn(report(task, method, path));
            streaming(head, body_rx)
        }
        Ok(Err(_)) => {
            // The writer went away without a head: the chain panicked.
            report(task, method, path).await;
            plain(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(_) => {
            tracing::warn!(%method, %path, "no response within the write timeout");
            tokio::spawn(report(task, method, path));
            plain(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn report(task: JoinHandle<harmony_core::Result<()>>, method: Method, path: String) {
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!(%method, %path, error = %err, "dispatch failed"),
        Err(err) if err.is_panic() => tracing::error!(%method, %path, "handler panicked"),
        Err(err) => tracing::error!(%method, %path, error = %err, "dispatch task failed"),
    }
}

fn streaming(head: Head, chunks: mpsc::Receiver<Chunk>) -> Response<ResponseBody> {
    let frames = stream::unfold(chunks, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk.map(Frame::data), rx))
    });

    let mut response = Response::new(StreamBody::new(frames).boxed_unsync());
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}

fn plain(status: StatusCode) -> Response<ResponseBody> {
    let text = status.canonical_reason().unwrap_or("Error");
    let body = Full::new(Bytes::from(text))
        .map_err(|never| match never {})
        .boxed_unsync();

    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
