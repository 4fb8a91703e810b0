//! Request binding through the full dispatch pipeline.

use harmony::core::testing::{ResponseRecorder, TestRequest};
use harmony::prelude::*;

#[derive(Debug, Default, Bind)]
#[bind(crate = "harmony::core")]
struct ShowUser {
    #[bind(path = "username")]
    name: String,
    #[bind(query = "is_active")]
    active: String,
    title: String,
}

fn show_user(ctx: &mut Context) -> Result<()> {
    let mut user = ShowUser::default();
    ctx.bind(&mut user)?;
    ctx.string(
        StatusCode::OK,
        &format!("name={} active={} title={}", user.name, user.active, user.title),
    )
}

#[derive(Debug, Default, Bind)]
#[bind(crate = "harmony::core")]
struct Page {
    #[bind(path = "id")]
    id: i64,
    #[bind(query = "limit")]
    limit: Option<u32>,
    #[bind(skip)]
    internal: String,
}

fn app() -> harmony::core::Dispatcher {
    let mut app = Harmony::new();
    app.post("/users/:username", show_user, &[]);
    app.get(
        "/pages/{id}",
        |ctx: &mut Context| {
            let mut page = Page {
                internal: "kept".to_string(),
                ..Page::default()
            };
            ctx.bind(&mut page)?;
            ctx.string(
                StatusCode::OK,
                &format!("{} {:?} {}", page.id, page.limit, page.internal),
            )
        },
        &[],
    );
    app.build().unwrap()
}

fn serve(request: harmony::core::Request) -> harmony::core::testing::Recording {
    let recorder = ResponseRecorder::new();
    let recording = recorder.recording();
    app().serve(request, Box::new(recorder)).unwrap();
    recording
}

#[test]
fn binds_path_query_and_body() {
    let request = TestRequest::post("/users/sujamess?is_active=true")
        .header("content-type", "application/json")
        .body(r#"{"title":"Hello, Harmony!"}"#)
        .build();

    let recording = serve(request);
    assert_eq!(recording.status(), StatusCode::OK);
    assert_eq!(
        recording.body_string(),
        "name=sujamess active=true title=Hello, Harmony!"
    );
}

#[test]
fn path_values_are_percent_decoded() {
    let recording = serve(TestRequest::post("/users/john%20doe?is_active=yes%21").build());
    assert_eq!(recording.status(), StatusCode::OK);
    assert_eq!(recording.body_string(), "name=john doe active=yes! title=");
}

#[test]
fn empty_body_leaves_body_fields_untouched() {
    let recording = serve(TestRequest::post("/users/ana").build());
    assert_eq!(recording.status(), StatusCode::OK);
    assert_eq!(recording.body_string(), "name=ana active= title=");
}

#[test]
fn malformed_body_is_a_client_error() {
    let request = TestRequest::post("/users/ana")
        .body("{not json")
        .build();

    // The default error hook only logs, so nothing is written.
    let recording = serve(request);
    assert_eq!(recording.written_status(), None);
    assert_eq!(recording.body_string(), "");
}

#[test]
fn typed_params_and_skipped_fields() {
    let recording = serve(TestRequest::get("/pages/42?limit=10").build());
    assert_eq!(recording.body_string(), "42 Some(10) kept");

    let recording = serve(TestRequest::get("/pages/42").build());
    assert_eq!(recording.body_string(), "42 None kept");
}

#[test]
fn coercion_failure_reaches_the_error_hook() {
    let mut app = Harmony::new();
    app.get(
        "/pages/{id}",
        |ctx: &mut Context| {
            let mut page = Page::default();
            ctx.bind(&mut page)?;
            ctx.send_status(StatusCode::OK)
        },
        &[],
    );
    app.on_error(|ctx, err| {
        let code = err.status_code();
        let _ = ctx.string(code, &err.to_string());
    });
    let dispatcher = app.build().unwrap();

    let recorder = ResponseRecorder::new();
    let recording = recorder.recording();
    dispatcher
        .serve(TestRequest::get("/pages/abc").build(), Box::new(recorder))
        .unwrap();

    assert_eq!(recording.status(), StatusCode::BAD_REQUEST);
    assert!(recording.body_string().contains("id"), "{}", recording.body_string());
}
