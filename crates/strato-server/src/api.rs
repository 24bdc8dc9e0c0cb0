//! REST, SSE, and admin surface.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::context::AppContext;
use crate::ws;
use strato_config::MaintenanceMode;
use strato_core::{RequestId, StratoError, ThreadId, UserId};
use strato_profile::ModelPriority;
use strato_queue::QueuedRequest;

/// Build the full axum router.
#[must_use]
pub fn build_router(app: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/chat", get(ws::ws_chat))
        .route("/upload", post(upload_file))
        .route("/message", post(submit_message))
        .route("/status/{request_id}", get(request_status))
        .route("/cancel/{request_id}", delete(cancel_request))
        .route("/admin/monitoring/stream", get(monitoring_stream))
        .route("/admin/queue", get(admin_queue_stats))
        .route("/admin/queue/purge", post(admin_queue_purge))
        .route("/admin/maintenance", post(admin_maintenance))
        .route("/admin/vram", get(admin_vram_status))
        .route("/admin/vram/load", post(admin_vram_load))
        .route("/admin/vram/unload", post(admin_vram_unload))
        .route("/admin/vram/evict", post(admin_vram_evict))
        .route("/admin/profile/{name}", post(admin_switch_profile))
        .route("/admin/users/{user_id}/grant", post(admin_grant_tokens))
        .route("/admin/users/{user_id}/ban", post(admin_ban))
        .route("/admin/users/{user_id}/unban", post(admin_unban))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}

fn error_response(error: &StratoError) -> Response {
    let status = match error {
        StratoError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
        StratoError::MaintenanceActive(_) => StatusCode::SERVICE_UNAVAILABLE,
        StratoError::TokenBudgetExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
        StratoError::InvalidToken => StatusCode::UNAUTHORIZED,
        StratoError::Forbidden => StatusCode::FORBIDDEN,
        StratoError::UnknownModel(_) | StratoError::InvalidProfile(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        axum::Json(json!({"error": error.to_string(), "kind": error.kind()})),
    )
        .into_response()
}

async fn health(State(app): State<Arc<AppContext>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "profile": app.profiles.active_name(),
        "queue_size": app.queue.size(),
        "connections": app.hub.count_connections(),
    }))
}

// --- Uploads ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UploadBody {
    filename: String,
    content_type: String,
    content_base64: String,
}

/// Store an upload and extract its content immediately, so requests that
/// reference the returned `FileRef` carry the extracted text with them.
async fn upload_file(
    State(app): State<Arc<AppContext>>,
    axum::Json(body): axum::Json<UploadBody>,
) -> Response {
    use base64::Engine;

    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(&body.content_base64)
    else {
        return (StatusCode::BAD_REQUEST, "invalid base64 content").into_response();
    };

    let safe_name = std::path::Path::new(&body.filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.bin".to_string());
    let storage_path = app
        .settings
        .temp_upload_dir
        .join(format!("{}_{safe_name}", uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::create_dir_all(&app.settings.temp_upload_dir).await {
        return error_response(&StratoError::Internal(e.to_string()));
    }
    if let Err(e) = tokio::fs::write(&storage_path, &bytes).await {
        return error_response(&StratoError::Internal(e.to_string()));
    }

    let extraction = app.extraction.extract(&storage_path, &body.content_type).await;
    let mut file_ref = strato_core::FileRef::new(
        safe_name,
        &body.content_type,
        bytes.len() as u64,
        storage_path,
    );
    file_ref.extracted_content = Some(extraction.text);

    axum::Json(file_ref).into_response()
}

// --- Synchronous submission -----------------------------------------------

#[derive(Debug, Deserialize)]
struct MessageBody {
    user_id: String,
    #[serde(default)]
    thread_id: Option<String>,
    message: String,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    thinking_enabled: Option<bool>,
}

async fn submit_message(
    State(app): State<Arc<AppContext>>,
    axum::Json(body): axum::Json<MessageBody>,
) -> Response {
    let mut request = QueuedRequest::new(
        UserId::new(&body.user_id),
        ThreadId::new(body.thread_id.as_deref().unwrap_or("default")),
        &body.message,
    );
    request.message_id = body.message_id.unwrap_or_default();
    request.channel_id = body.channel_id.unwrap_or_default();
    request.interface = body.interface.unwrap_or_else(|| "web".to_string());
    request.model = body.model;
    request.temperature = body.temperature;
    request.thinking_enabled = body.thinking_enabled;

    match app.submit(request).await {
        Ok((request, position)) => {
            // Rough worst-case wait: ~30 s per queued turn ahead of us.
            let eta_seconds = (position.saturating_sub(1) as u64).saturating_mul(30);
            axum::Json(json!({
                "request_id": request.request_id,
                "status": "queued",
                "queue_position": position,
                "eta_seconds": eta_seconds,
            }))
            .into_response()
        },
        Err(error) => error_response(&error),
    }
}

async fn request_status(
    State(app): State<Arc<AppContext>>,
    Path(request_id): Path<String>,
) -> Response {
    let request_id = RequestId::from_string(request_id);
    match app.queue.status(&request_id).await {
        Some(status) => axum::Json(json!({
            "request_id": request_id,
            "state": status,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"error": "unknown request"})),
        )
            .into_response(),
    }
}

async fn cancel_request(
    State(app): State<Arc<AppContext>>,
    Path(request_id): Path<String>,
) -> Response {
    let request_id = RequestId::from_string(request_id);
    let cancelled = app.cancel_request(&request_id).await;
    axum::Json(json!({"request_id": request_id, "cancelled": cancelled})).into_response()
}

// --- Monitoring SSE ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AdminParams {
    #[serde(default)]
    token: String,
}

fn require_admin(app: &AppContext, token: &str) -> Result<(), Response> {
    if app.verifier.verify_admin(token).is_some() {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "admin token required").into_response())
    }
}

async fn monitoring_stream(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }

    let stream = monitoring_events(app);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn monitoring_events(
    app: Arc<AppContext>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        loop {
            let snapshot = app.monitoring_snapshot().await;
            let data = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
            yield Ok(Event::default().data(data));
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}

// --- Admin commands ---------------------------------------------------------

async fn admin_queue_stats(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    axum::Json(json!({
        "size": app.queue.size(),
        "is_full": app.queue.is_full(),
    }))
    .into_response()
}

async fn admin_queue_purge(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    let dropped = app.queue.purge().await;
    axum::Json(json!({"dropped": dropped})).into_response()
}

#[derive(Debug, Deserialize)]
struct MaintenanceBody {
    mode: String,
}

async fn admin_maintenance(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
    axum::Json(body): axum::Json<MaintenanceBody>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    match body.mode.parse::<MaintenanceMode>() {
        Ok(mode) => {
            app.set_maintenance_mode(mode);
            info!(mode = %body.mode, "maintenance mode changed");
            axum::Json(json!({"mode": body.mode})).into_response()
        },
        Err(e) => (StatusCode::BAD_REQUEST, e).into_response(),
    }
}

async fn admin_vram_status(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    let status = app.vram.status().await;
    let fallback = app.profile_manager.status().await;
    axum::Json(json!({"vram": status, "fallback": fallback})).into_response()
}

#[derive(Debug, Deserialize)]
struct ModelBody {
    model: String,
}

async fn admin_vram_load(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
    axum::Json(body): axum::Json<ModelBody>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    match app.vram.ensure_loaded(&body.model, None).await {
        Ok(()) => axum::Json(json!({"loaded": body.model})).into_response(),
        Err(e) => error_response(&e.into()),
    }
}

async fn admin_vram_unload(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
    axum::Json(body): axum::Json<ModelBody>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    match app.vram.mark_unloaded(&body.model).await {
        Ok(()) => axum::Json(json!({"unloaded": body.model})).into_response(),
        Err(e) => error_response(&e.into()),
    }
}

#[derive(Debug, Deserialize)]
struct EvictBody {
    #[serde(default)]
    below_priority: Option<String>,
}

async fn admin_vram_evict(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
    axum::Json(body): axum::Json<EvictBody>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    let priority = match body.below_priority.as_deref() {
        Some("HIGH") => ModelPriority::High,
        Some("LOW") => ModelPriority::Low,
        _ => ModelPriority::Normal,
    };
    let victim = app.vram.emergency_evict(priority).await;
    axum::Json(json!({"victim": victim})).into_response()
}

async fn admin_switch_profile(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
    Path(name): Path<String>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    match app.profiles.switch(&name) {
        Ok(()) => axum::Json(json!({"profile": name})).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct GrantBody {
    tokens: u64,
}

async fn admin_grant_tokens(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
    Path(user_id): Path<String>,
    axum::Json(body): axum::Json<GrantBody>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    let user_id = UserId::new(user_id);
    match app.users.get(&user_id).await {
        Ok(Some(mut user)) => {
            user.bonus_tokens = user.bonus_tokens.saturating_add(body.tokens);
            let remaining = user.tokens_remaining();
            match app.users.save(user).await {
                Ok(()) => axum::Json(json!({"tokens_remaining": remaining})).into_response(),
                Err(e) => error_response(&e.into()),
            }
        },
        Ok(None) => (StatusCode::NOT_FOUND, "unknown user").into_response(),
        Err(e) => error_response(&e.into()),
    }
}

async fn admin_set_banned(app: &AppContext, user_id: &str, banned: bool) -> Response {
    let user_id = UserId::new(user_id);
    match app.users.get(&user_id).await {
        Ok(Some(mut user)) => {
            user.banned = banned;
            match app.users.save(user).await {
                Ok(()) => axum::Json(json!({"user_id": user_id, "banned": banned})).into_response(),
                Err(e) => error_response(&e.into()),
            }
        },
        Ok(None) => (StatusCode::NOT_FOUND, "unknown user").into_response(),
        Err(e) => error_response(&e.into()),
    }
}

async fn admin_ban(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
    Path(user_id): Path<String>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    admin_set_banned(&app, &user_id, true).await
}

async fn admin_unban(
    State(app): State<Arc<AppContext>>,
    Query(params): Query<AdminParams>,
    Path(user_id): Path<String>,
) -> Response {
    if let Err(rejection) = require_admin(&app, &params.token) {
        return rejection;
    }
    admin_set_banned(&app, &user_id, false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenVerifier;
    use strato_config::Settings;

    async fn app() -> Arc<AppContext> {
        AppContext::build(
            Settings::default(),
            Arc::new(StaticTokenVerifier::new("", "admin-token")),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_router_builds() {
        let _router = build_router(app().await);
    }

    #[tokio::test]
    async fn test_admin_gate() {
        let app = app().await;
        assert!(require_admin(&app, "admin-token").is_ok());
        assert!(require_admin(&app, "wrong").is_err());
    }

    #[test]
    fn test_error_statuses() {
        let response = error_response(&StratoError::QueueFull);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = error_response(&StratoError::MaintenanceActive("down".to_string()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = error_response(&StratoError::Forbidden);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
