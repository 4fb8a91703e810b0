//! End-to-end requests over a real socket.

use std::io::Read;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use harmony::config::{HarmonyConfig, ServerConfig as ServerSection};
use harmony::prelude::*;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

#[derive(Debug, Default, Bind)]
#[bind(crate = "harmony::core")]
struct Greeting {
    #[bind(path = "name")]
    name: String,
    #[bind(query = "shout")]
    shout: bool,
    message: String,
}

fn greet(ctx: &mut Context) -> Result<()> {
    let mut greeting = Greeting::default();
    ctx.bind(&mut greeting)?;
    let mut text = format!("{}, {}", greeting.message, greeting.name);
    if greeting.shout {
        text = text.to_uppercase();
    }
    ctx.string(StatusCode::OK, &text)
}

async fn start() -> (Server, SocketAddr) {
    let config = HarmonyConfig::builder()
        .server(ServerSection {
            http_addr: "127.0.0.1:0".to_string(),
            ..Default::default()
        })
        .build();

    let mut app = Harmony::new();
    app.post("/greet/:name", greet, &[]);
    app.get(
        "/report",
        |ctx: &mut Context| ctx.string(StatusCode::OK, &"all quiet ".repeat(100)),
        &[],
    );

    let mut server = harmony::settings::server(&config, app).unwrap();
    let addr = server.start().await.unwrap();
    (server, addr)
}

#[tokio::test(flavor = "multi_thread")]
async fn serves_bound_and_compressed_responses() {
    let (mut server, addr) = start().await;
    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();

    let request = http::Request::post(format!("http://{addr}/greet/ana?shout=true"))
        .header("content-type", "application/json")
        .header("accept-encoding", "identity")
        .body(Full::new(Bytes::from_static(br#"{"message":"hello"}"#)))
        .unwrap();
    let response = client.request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"HELLO, ANA");

    let request = http::Request::get(format!("http://{addr}/report"))
        .header("accept-encoding", "gzip")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = client.request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-encoding"], "gzip");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let mut text = String::new();
    GzDecoder::new(&body[..]).read_to_string(&mut text).unwrap();
    assert_eq!(text, "all quiet ".repeat(100));

    drop(client);
    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_routes_get_not_found() {
    let (mut server, addr) = start().await;
    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();

    let request = http::Request::get(format!("http://{addr}/missing"))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = client.request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    drop(client);
    server.shutdown(Duration::from_secs(5)).await.unwrap();
}
