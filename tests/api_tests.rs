use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use futures::StreamExt;
use http_body_util::BodyExt;
use livetail::auth;
use livetail::config::Config;
use livetail::server::{create_router, AppState};
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt;

const API_KEY: &str = "test-key";
const SECRET: &str = "test-secret";

fn test_state(data_dir: &Path) -> AppState {
    let config = Config {
        data_dir: data_dir.to_path_buf(),
        api_key: API_KEY.to_string(),
        session_secret: SECRET.to_string(),
        ..Config::default()
    };
    AppState::new(config)
}

fn session_cookie(user: &str) -> String {
    format!("session={}", auth::sign_session(SECRET, user))
}

async fn body_json(response: axum::response::Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

fn ingest_request(key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

#[tokio::test]
async fn ingest_appends_in_order_and_acks_the_count() -> Result<()> {
    let dir = tempdir()?;
    let state = test_state(dir.path());
    let app = create_router(state.clone());

    // Tail opened before the ingest call must observe both lines in order.
    let mut cursor = state.store.open_tail()?;

    let response = app
        .oneshot(ingest_request(Some(API_KEY), json!({"lines": ["hello", "world"]})))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?, json!({"ok": true, "count": 2}));

    assert_eq!(cursor.read_next()?, Some("hello".to_string()));
    assert_eq!(cursor.read_next()?, Some("world".to_string()));
    assert_eq!(cursor.read_next()?, None);

    assert!(state.liveness.is_alive(Utc::now()));
    Ok(())
}

#[tokio::test]
async fn ingest_with_bad_key_leaves_the_store_untouched() -> Result<()> {
    let dir = tempdir()?;
    let state = test_state(dir.path());
    let app = create_router(state.clone());

    let response = app
        .clone()
        .oneshot(ingest_request(Some("wrong"), json!({"lines": ["sneaky"]})))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(ingest_request(None, json!({"lines": ["sneaky"]})))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(state.store.is_empty());
    assert!(!state.liveness.has_seen());
    Ok(())
}

#[tokio::test]
async fn ingest_rejects_malformed_payloads() -> Result<()> {
    let dir = tempdir()?;
    let state = test_state(dir.path());
    let app = create_router(state.clone());

    for bad in [json!({"lines": "not-a-list"}), json!({"lines": [1, 2]}), json!([])] {
        let response = app
            .clone()
            .oneshot(ingest_request(Some(API_KEY), bad))
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await?,
            json!({"ok": false, "error": "invalid payload"})
        );
    }

    assert!(state.store.is_empty());
    Ok(())
}

#[tokio::test]
async fn heartbeat_marks_the_source_seen_without_writing() -> Result<()> {
    let dir = tempdir()?;
    let state = test_state(dir.path());
    let app = create_router(state.clone());

    let before = Utc::now().timestamp();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/heartbeat")
                .header("X-API-Key", API_KEY)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await?;
    assert_eq!(body["ok"], json!(true));
    let ts = body["ts"].as_i64().expect("ts is an integer");
    assert!(ts >= before && ts <= Utc::now().timestamp());

    assert!(state.liveness.is_alive(Utc::now()));
    assert!(state.store.is_empty());
    Ok(())
}

#[tokio::test]
async fn health_needs_no_credentials() -> Result<()> {
    let dir = tempdir()?;
    let app = create_router(test_state(dir.path()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?, json!({"ok": true}));
    Ok(())
}

#[tokio::test]
async fn stream_redirects_unauthenticated_clients_to_login() -> Result<()> {
    let dir = tempdir()?;
    let app = create_router(test_state(dir.path()));

    let response = app
        .oneshot(Request::builder().uri("/stream-logs").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    Ok(())
}

#[tokio::test]
async fn stream_opens_with_the_retry_directive() -> Result<()> {
    let dir = tempdir()?;
    let app = create_router(test_state(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/stream-logs")
                .header(header::COOKIE, session_cookie("tester"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()?
        .starts_with("text/event-stream"));

    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(2), frames.next())
        .await?
        .expect("stream produced a frame")?;
    assert!(String::from_utf8_lossy(&first).contains("retry: 2000"));
    Ok(())
}

#[tokio::test]
async fn login_accepts_a_code_once() -> Result<()> {
    let dir = tempdir()?;
    let state = test_state(dir.path());
    let app = create_router(state.clone());

    let code = state
        .codes
        .issue("tester", Duration::from_secs(600), Utc::now())?;

    let login = |code: String| {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("otp={}", code)))
            .expect("request")
    };

    let response = app.clone().oneshot(login(code.clone())).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/logs");
    let cookie = response.headers()[header::SET_COOKIE].to_str()?.to_string();
    assert!(cookie.starts_with("session=tester."));

    // Codes are single-use: the replay renders the form again.
    let replay = app.oneshot(login(code)).await?;
    assert_eq!(replay.status(), StatusCode::OK);
    let body = replay.into_body().collect().await?.to_bytes();
    assert!(String::from_utf8_lossy(&body).contains("Invalid or expired code"));
    Ok(())
}

#[tokio::test]
async fn logs_page_shows_the_trailing_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let state = test_state(dir.path());
    let app = create_router(state.clone());

    state
        .store
        .append(&["alpha".to_string(), "beta".to_string()])?;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/logs")
                .header(header::COOKIE, session_cookie("tester"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await?.to_bytes();
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("alpha"));
    assert!(html.contains("beta"));

    // Without a session cookie the page bounces to the login form.
    let response = create_router(state)
        .oneshot(Request::builder().uri("/logs").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    Ok(())
}
