//! REST endpoints for triggering runs, reading progress, and editing settings.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::{DispatchConfig, ServerConfig};
use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, Error};
use crate::store::{SavedTemplate, SettingsStore};
use crate::template;

/// Required app-password length for the relay account.
pub const APP_PASSWORD_LEN: usize = 16;

/// Recipient file extensions listed by `/api/files`.
const RECIPIENT_EXTENSIONS: &[&str] = &["csv"];

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub settings: Arc<SettingsStore>,
    pub server: Arc<ServerConfig>,
}

/// Build the Axum router.
pub fn api_routes(
    dispatcher: Arc<Dispatcher>,
    settings: Arc<SettingsStore>,
    server: Arc<ServerConfig>,
) -> Router {
    let state = AppState {
        dispatcher,
        settings,
        server,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/send", post(start_sending))
        .route("/api/status", get(get_status))
        .route("/api/logs", get(get_logs))
        .route("/api/logs/stream", get(stream_logs))
        .route("/api/counter/reset", post(reset_counter))
        .route("/api/stopper", post(set_stopper))
        .route("/api/save-credentials", post(save_credentials))
        .route("/api/credentials/clear", post(clear_credentials))
        .route("/api/templates", get(get_templates))
        .route("/api/templates/save", post(save_template))
        .route("/api/files", get(list_files))
        .route("/api/files/set-default", post(set_default_file))
        .route("/api/files/delete", post(delete_file))
        .route("/api/resume", get(get_resume))
        .route("/api/resume/set-default", post(set_resume))
        .route("/api/resume/delete", post(delete_resume))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn success() -> Response {
    Json(serde_json::json!({ "success": true })).into_response()
}

fn store_failure(e: impl std::fmt::Display) -> Response {
    warn!(error = %e, "Settings write failed");
    error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save settings")
}

/// Accept a bare file name only; anything that could escape the upload dir is rejected.
fn sanitize_file_name(name: &str) -> Option<&str> {
    let name = name.trim();
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    (!bad).then_some(name)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "campaign-mailer"
    }))
}

// ── Dispatch ────────────────────────────────────────────────────────────

async fn start_sending(State(state): State<AppState>) -> Response {
    let settings = state.settings.load().await;
    let config = DispatchConfig::from_settings(&settings, &state.server);

    match state.dispatcher.start(config) {
        Ok(_handle) => {
            info!("Dispatch triggered");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "success": true,
                    "message": "Email sending process initiated."
                })),
            )
                .into_response()
        }
        Err(e @ DispatchError::AlreadyRunning) => error_json(StatusCode::CONFLICT, e.to_string()),
    }
}

async fn get_status(State(state): State<AppState>) -> Response {
    let settings = state.settings.load().await;
    let config = DispatchConfig::from_settings(&settings, &state.server);
    let status = state.dispatcher.status(&config).await;

    Json(serde_json::json!({
        "cursor": status.cursor,
        "totalRecipients": status.total_recipients,
        "stopperLimit": status.stopper_limit,
        "running": status.running,
        "email": settings.email.unwrap_or_default(),
    }))
    .into_response()
}

async fn get_logs(State(state): State<AppState>) -> Response {
    let events = state.dispatcher.events().await;
    let logs: Vec<String> = events.iter().map(ToString::to_string).collect();
    Json(serde_json::json!({ "logs": logs, "events": events })).into_response()
}

async fn stream_logs(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.dispatcher.event_log().subscribe();
    // Lagged receivers skip what they missed; /api/logs has the full snapshot.
    let stream = BroadcastStream::new(rx).filter_map(|item| {
        item.ok()
            .and_then(|event| Event::default().json_data(&event).ok())
            .map(Ok)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn reset_counter(State(state): State<AppState>) -> Response {
    match state.dispatcher.reset_cursor().await {
        Ok(()) => success(),
        Err(Error::Dispatch(e)) => error_json(StatusCode::CONFLICT, e.to_string()),
        Err(e) => {
            warn!(error = %e, "Cursor reset failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct StopperRequest {
    value: serde_json::Value,
}

fn parse_stopper(value: &serde_json::Value) -> Option<usize> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_u64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    usize::try_from(n).ok().filter(|n| *n > 0)
}

async fn set_stopper(State(state): State<AppState>, Json(body): Json<StopperRequest>) -> Response {
    let Some(stopper) = parse_stopper(&body.value) else {
        return error_json(
            StatusCode::BAD_REQUEST,
            "Invalid stopper value. Must be a positive number.",
        );
    };

    match state.settings.update(|s| s.stopper = Some(stopper)).await {
        Ok(_) => success(),
        Err(e) => store_failure(e),
    }
}

// ── Credentials ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CredentialsRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn save_credentials(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Response {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "Email and password are required.");
    }
    if body.password.chars().count() != APP_PASSWORD_LEN {
        return error_json(
            StatusCode::BAD_REQUEST,
            format!("App Password must be {APP_PASSWORD_LEN} characters long."),
        );
    }

    let email = body.email.trim().to_string();
    match state
        .settings
        .update(|s| {
            s.email = Some(email);
            s.password = Some(body.password);
        })
        .await
    {
        Ok(_) => Json(serde_json::json!({
            "success": true,
            "message": "Credentials saved successfully."
        }))
        .into_response(),
        Err(e) => store_failure(e),
    }
}

async fn clear_credentials(State(state): State<AppState>) -> Response {
    match state
        .settings
        .update(|s| {
            s.email = None;
            s.password = None;
        })
        .await
    {
        Ok(_) => Json(serde_json::json!({
            "success": true,
            "message": "Credentials cleared."
        }))
        .into_response(),
        Err(e) => store_failure(e),
    }
}

// ── Templates ───────────────────────────────────────────────────────────

async fn get_templates(State(state): State<AppState>) -> Response {
    let templates: BTreeMap<_, _> = template::built_ins().into_iter().collect();
    let settings = state.settings.load().await;

    Json(serde_json::json!({
        "templates": templates,
        "current_template": settings.current_template.unwrap_or_default(),
    }))
    .into_response()
}

async fn save_template(State(state): State<AppState>, Json(body): Json<SavedTemplate>) -> Response {
    match state
        .settings
        .update(|s| s.current_template = Some(body))
        .await
    {
        Ok(_) => success(),
        Err(e) => store_failure(e),
    }
}

// ── Files ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FileRequest {
    filename: String,
}

fn is_recipient_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| RECIPIENT_EXTENSIONS.iter().any(|r| e.eq_ignore_ascii_case(r)))
}

async fn list_files(State(state): State<AppState>) -> Response {
    let mut files = Vec::new();
    match tokio::fs::read_dir(&state.server.upload_dir).await {
        Ok(mut entries) => {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.is_file() && is_recipient_file(&path) {
                    files.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, "Failed to list upload directory"),
    }
    files.sort();

    let settings = state.settings.load().await;
    Json(serde_json::json!({
        "files": files,
        "default_file": settings.default_file,
    }))
    .into_response()
}

async fn set_default_file(
    State(state): State<AppState>,
    Json(body): Json<FileRequest>,
) -> Response {
    let Some(name) = sanitize_file_name(&body.filename) else {
        return error_json(StatusCode::BAD_REQUEST, "Invalid file name");
    };
    if !state.server.upload_path(name).is_file() {
        return error_json(StatusCode::NOT_FOUND, "File not found");
    }

    let name = name.to_string();
    match state.settings.update(|s| s.default_file = Some(name)).await {
        Ok(_) => success(),
        Err(e) => store_failure(e),
    }
}

async fn delete_file(State(state): State<AppState>, Json(body): Json<FileRequest>) -> Response {
    let Some(name) = sanitize_file_name(&body.filename) else {
        return error_json(StatusCode::BAD_REQUEST, "Invalid file name");
    };

    match tokio::fs::remove_file(state.server.upload_path(name)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return error_json(StatusCode::NOT_FOUND, "File not found");
        }
        Err(e) => {
            warn!(error = %e, file = name, "Failed to delete file");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete file");
        }
    }

    let result = state
        .settings
        .update(|s| {
            if s.default_file.as_deref() == Some(name) {
                s.default_file = None;
            }
        })
        .await;

    match result {
        Ok(_) => success(),
        Err(e) => store_failure(e),
    }
}

// ── Attachment ──────────────────────────────────────────────────────────

async fn get_resume(State(state): State<AppState>) -> Response {
    let settings = state.settings.load().await;
    Json(serde_json::json!({ "resume_file": settings.resume_file })).into_response()
}

async fn set_resume(State(state): State<AppState>, Json(body): Json<FileRequest>) -> Response {
    let Some(name) = sanitize_file_name(&body.filename) else {
        return error_json(StatusCode::BAD_REQUEST, "Invalid file name");
    };
    if !state.server.upload_path(name).is_file() {
        return error_json(StatusCode::NOT_FOUND, "File not found");
    }

    let name = name.to_string();
    info!(file = %name, "Attachment selected");
    match state.settings.update(|s| s.resume_file = Some(name)).await {
        Ok(_) => success(),
        Err(e) => store_failure(e),
    }
}

async fn delete_resume(State(state): State<AppState>) -> Response {
    let settings = state.settings.load().await;
    let Some(name) = settings.resume_file else {
        return error_json(StatusCode::NOT_FOUND, "No resume file to delete");
    };

    if let Some(safe) = sanitize_file_name(&name) {
        let path = state.server.upload_path(safe);
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(error = %e, path = %path.display(), "Failed to delete resume");
        }
    }

    match state.settings.update(|s| s.resume_file = None).await {
        Ok(_) => success(),
        Err(e) => store_failure(e),
    }
}
