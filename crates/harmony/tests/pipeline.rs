//! Logger and gzip decorators composed around real routes.

use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;

use flate2::read::GzDecoder;
use harmony::config::{ConfigLoader, HarmonyConfig};
use harmony::core::testing::{Recording, ResponseRecorder, TestRequest};
use harmony::core::{Dispatcher, Request};
use harmony::prelude::*;
use parking_lot::Mutex;

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

fn with_access_log<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    let capture = Capture::default();
    let sink = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_level(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, capture.lines())
}

fn routes(app: &mut Harmony) {
    app.get(
        "/report",
        |ctx: &mut Context| ctx.string(StatusCode::OK, &"harmony ".repeat(200)),
        &[],
    );
    app.get("/tiny", |ctx: &mut Context| ctx.string(StatusCode::OK, "ok"), &[]);
    app.post(
        "/items",
        |ctx: &mut Context| ctx.json(StatusCode::CREATED, &serde_json::json!({"id": 7})),
        &[],
    );
}

fn dispatcher(config: &HarmonyConfig) -> Dispatcher {
    let mut app = Harmony::new();
    routes(&mut app);
    harmony::settings::install(&mut app, config).unwrap();
    app.build().unwrap()
}

fn serve(dispatcher: &Dispatcher, request: Request) -> Recording {
    let recorder = ResponseRecorder::new();
    let recording = recorder.recording();
    dispatcher.serve(request, Box::new(recorder)).unwrap();
    recording
}

fn gunzip(bytes: &[u8]) -> String {
    let mut out = String::new();
    GzDecoder::new(bytes).read_to_string(&mut out).unwrap();
    out
}

fn peer() -> SocketAddr {
    "10.1.2.3:5555".parse().unwrap()
}

#[test]
fn large_response_is_compressed_and_logged_once() {
    let config = HarmonyConfig::default();
    let dispatcher = dispatcher(&config);

    let request = TestRequest::get("/report")
        .header("accept-encoding", "gzip, deflate")
        .header("host", "example.com")
        .remote_addr(peer())
        .build();
    let (recording, lines) = with_access_log(|| serve(&dispatcher, request));

    assert_eq!(recording.status(), StatusCode::OK);
    assert_eq!(recording.header("content-encoding").as_deref(), Some("gzip"));
    assert_eq!(recording.header("vary").as_deref(), Some("Accept-Encoding"));
    assert_eq!(gunzip(&recording.body()), "harmony ".repeat(200));

    assert_eq!(lines.len(), 1, "{lines:?}");
    assert!(
        lines[0].contains(r#"10.1.2.3 - example.com "GET /report HTTP/1.1" 200"#),
        "{}",
        lines[0]
    );
}

#[test]
fn small_response_stays_plain_below_threshold() {
    let config = ConfigLoader::new()
        .with_string("[gzip]\nmin_length = 64\n", "toml")
        .unwrap()
        .load()
        .unwrap();
    let dispatcher = dispatcher(&config);

    let request = TestRequest::get("/tiny")
        .header("accept-encoding", "gzip")
        .build();
    let recording = serve(&dispatcher, request);

    assert_eq!(recording.body_string(), "ok");
    assert_eq!(recording.header("content-encoding"), None);
    assert_eq!(recording.header("vary").as_deref(), Some("Accept-Encoding"));
}

#[test]
fn logger_sees_handler_status_not_compressed_size() {
    let config = HarmonyConfig::builder()
        .logger(harmony::config::LoggerConfigSection {
            format: "{method} {path} {status}".to_string(),
            ..Default::default()
        })
        .build();
    let dispatcher = dispatcher(&config);

    let request = TestRequest::post("/items")
        .header("accept-encoding", "gzip")
        .build();
    let (recording, lines) = with_access_log(|| serve(&dispatcher, request));

    assert_eq!(recording.status(), StatusCode::CREATED);
    let body: serde_json::Value = serde_json::from_str(&gunzip(&recording.body())).unwrap();
    assert_eq!(body["id"], 7);
    assert!(lines[0].contains("POST /items 201"), "{}", lines[0]);
}

#[test]
fn unmatched_requests_still_pass_through_global_middleware() {
    let dispatcher = dispatcher(&HarmonyConfig::default());

    let (recording, lines) = with_access_log(|| {
        serve(
            &dispatcher,
            TestRequest::get("/nowhere").header("accept-encoding", "identity").build(),
        )
    });
    assert_eq!(recording.status(), StatusCode::NOT_FOUND);
    assert_eq!(recording.header("vary").as_deref(), Some("Accept-Encoding"));
    assert!(lines[0].contains("404"), "{}", lines[0]);

    let recording = serve(&dispatcher, TestRequest::new(Method::DELETE, "/tiny").build());
    assert_eq!(recording.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(recording.header("allow").as_deref(), Some("GET"));
}

#[test]
fn disabled_middleware_is_not_installed() {
    let config = ConfigLoader::new()
        .with_string(
            r#"{"gzip": {"enabled": false}, "logger": {"enabled": false}}"#,
            "json",
        )
        .unwrap()
        .load()
        .unwrap();
    let dispatcher = dispatcher(&config);

    let request = TestRequest::get("/report")
        .header("accept-encoding", "gzip")
        .build();
    let (recording, lines) = with_access_log(|| serve(&dispatcher, request));

    assert_eq!(recording.header("content-encoding"), None);
    assert_eq!(recording.header("vary"), None);
    assert!(lines.is_empty(), "{lines:?}");
}

#[test]
fn contexts_are_reused_across_requests() {
    let dispatcher = dispatcher(&HarmonyConfig::default());
    for _ in 0..3 {
        serve(&dispatcher, TestRequest::get("/tiny").build());
    }
    assert_eq!(dispatcher.idle_contexts(), 1);
}
