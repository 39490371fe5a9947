use std::sync::Arc;

use askama::Template;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{sse::Sse, Html, IntoResponse, Json, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::auth::{self, CodeStore};
use crate::config::Config;
use crate::liveness::LivenessTracker;
use crate::store::LogStore;
use crate::stream::{sse_events, TailFollower};

/// Shared handles passed into every handler and tail session.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: LogStore,
    pub liveness: Arc<LivenessTracker>,
    pub codes: CodeStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = LogStore::new(config.log_path());
        let liveness = Arc::new(LivenessTracker::new(config.source_timeout()));
        let codes = CodeStore::new(config.code_store_path());
        Self {
            config: Arc::new(config),
            store,
            liveness,
            codes,
        }
    }
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "logs.html")]
struct LogsTemplate {
    lines: Vec<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    otp: String,
}

#[derive(Deserialize)]
struct IngestBody {
    lines: Vec<String>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .route("/logs", get(logs_page))
        .route("/stream-logs", get(stream_logs))
        .route("/ingest", post(ingest))
        .route("/heartbeat", get(heartbeat))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}

/// Binds and serves until the process is stopped.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind;
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn session_user(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    let value = cookies
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))?;
    auth::verify_session(&state.config.session_secret, value)
}

fn render<T: Template>(template: T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("template rendering failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"ok": false, "error": "forbidden"})),
    )
        .into_response()
}

// ---------- Pages ----------

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    if session_user(&state, &headers).is_some() {
        Redirect::to("/logs")
    } else {
        Redirect::to("/login")
    }
}

async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if session_user(&state, &headers).is_some() {
        return Redirect::to("/logs").into_response();
    }
    render(LoginTemplate { error: None })
}

async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.codes.authenticate(&form.otp, Utc::now()) {
        Some(user) => {
            info!(user = %user, "login accepted");
            let cookie = format!(
                "session={}; HttpOnly; Path=/; SameSite=Lax",
                auth::sign_session(&state.config.session_secret, &user)
            );
            ([(header::SET_COOKIE, cookie)], Redirect::to("/logs")).into_response()
        }
        None => {
            warn!("login rejected");
            render(LoginTemplate {
                error: Some("Invalid or expired code.".to_string()),
            })
        }
    }
}

async fn logout() -> Response {
    let cookie = "session=; HttpOnly; Path=/; Max-Age=0".to_string();
    ([(header::SET_COOKIE, cookie)], Redirect::to("/login")).into_response()
}

async fn logs_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if session_user(&state, &headers).is_none() {
        return Redirect::to("/login").into_response();
    }
    let lines = state
        .store
        .snapshot_tail(state.config.snapshot_lines)
        .unwrap_or_default();
    render(LogsTemplate { lines })
}

// ---------- Live tail (SSE) ----------

async fn stream_logs(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if session_user(&state, &headers).is_none() {
        return Redirect::to("/login").into_response();
    }
    let cursor = match state.store.open_tail() {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("failed to open tail cursor: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let follower = TailFollower::new(
        cursor,
        state.liveness.clone(),
        state.config.ping_interval(),
        state.config.poll_interval(),
    );
    Sse::new(sse_events(follower, state.config.retry())).into_response()
}

// ---------- Ingest from the source agent ----------

async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !auth::require_api_key(&headers, &state.config.api_key) {
        warn!("ingest rejected: bad or missing API key");
        return forbidden();
    }
    let payload: IngestBody = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "error": "invalid payload"})),
            )
                .into_response()
        }
    };
    if let Err(e) = state.store.append(&payload.lines) {
        error!("log append failed: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"ok": false, "error": "append failed"})),
        )
            .into_response();
    }
    state.liveness.mark_seen(Utc::now());
    Json(json!({"ok": true, "count": payload.lines.len()})).into_response()
}

async fn heartbeat(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !auth::require_api_key(&headers, &state.config.api_key) {
        return forbidden();
    }
    let now = Utc::now();
    state.liveness.mark_seen(now);
    Json(json!({"ok": true, "ts": now.timestamp()})).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({"ok": true}))
}
