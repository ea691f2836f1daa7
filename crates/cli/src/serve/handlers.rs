//! HTTP route handlers: chat turns, undo/redo and read-only scene views.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use easel_core::{Color, ShapeFilter, ShapeKind};
use easel_engine::{EngineError, ExternalAnswer};
use easel_storage::SceneStorage;
use serde::Deserialize;

use super::json_error;
use super::state::AppState;

// ── Request bodies ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    thread_id: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContinueRequest {
    thread_id: String,
    resume_token: String,
    #[serde(default)]
    answer: ExternalAnswer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionRequest {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShapesQuery {
    kind: Option<String>,
    color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<usize>,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Map an engine error to its HTTP status and a JSON body.
fn engine_error(e: EngineError) -> Response {
    let status = match &e {
        EngineError::MissingSession | EngineError::SessionMismatch { .. } => {
            StatusCode::BAD_REQUEST
        }
        EngineError::ThreadBusy { .. }
        | EngineError::NoPendingSuspension { .. }
        | EngineError::TokenMismatch { .. } => StatusCode::CONFLICT,
        EngineError::InvalidTransition { .. }
        | EngineError::Storage(_)
        | EngineError::CorruptContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "request failed");
    }
    let body = serde_json::json!({
        "error": e.to_string(),
        "kind": e.failure_kind(),
    });
    (status, Json(body)).into_response()
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> Response {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response)).into_response()
}

/// POST /chat
pub(crate) async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let session = req.session_id.unwrap_or_default();
    match state
        .engine
        .submit(&session, req.thread_id.as_deref(), &req.message)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => engine_error(e),
    }
}

/// POST /chat/continue
pub(crate) async fn handle_continue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContinueRequest>,
) -> Response {
    match state
        .engine
        .resume(&req.thread_id, &req.resume_token, req.answer)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => engine_error(e),
    }
}

/// POST /undo
pub(crate) async fn handle_undo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Response {
    let session = req.session_id.unwrap_or_default();
    match state.engine.undo(&session).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => engine_error(e),
    }
}

/// POST /redo
pub(crate) async fn handle_redo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Response {
    let session = req.session_id.unwrap_or_default();
    match state.engine.redo(&session).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => engine_error(e),
    }
}

/// GET /shapes
pub(crate) async fn handle_shapes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ShapesQuery>,
) -> Response {
    let kind = match query.kind.as_deref().map(str::parse::<ShapeKind>).transpose() {
        Ok(k) => k,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e),
    };
    let color = match query.color.as_deref().map(Color::parse).transpose() {
        Ok(c) => c,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    match state
        .engine
        .storage()
        .list_shapes(&ShapeFilter { kind, color })
        .await
    {
        Ok(shapes) => {
            let body = serde_json::json!({ "count": shapes.len(), "shapes": shapes });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => engine_error(e.into()),
    }
}

/// GET /history/{session}
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.engine.history(&session, query.limit).await {
        Ok(entries) => (StatusCode::OK, Json(serde_json::json!({ "entries": entries }))).into_response(),
        Err(e) => engine_error(e),
    }
}
