//! `easel serve` -- HTTP JSON API over the scene engine.
//!
//! Endpoints:
//! - GET  /health               - Server status
//! - POST /chat                 - Submit a message on a thread
//! - POST /chat/continue        - Resume a suspended thread with a scene answer
//! - POST /undo                 - Undo the session's last change
//! - POST /redo                 - Redo the session's last undone change
//! - GET  /shapes               - Current shapes, newest first (?kind=&color=)
//! - GET  /history/{session}    - Recent operations for a session (?limit=)
//!
//! All responses use Content-Type: application/json. Busy threads and stale
//! resume tokens answer 409, a missing session 400, storage failures 500.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use self::handlers::{
    handle_chat, handle_continue, handle_health, handle_history, handle_not_found, handle_redo,
    handle_shapes, handle_undo,
};
use self::middleware::trace_requests;
use self::state::AppState;
use crate::config::EaselConfig;
use crate::runtime;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/chat/continue", post(handle_continue))
        .route("/undo", post(handle_undo))
        .route("/redo", post(handle_redo))
        .route("/shapes", get(handle_shapes))
        .route("/history/{session}", get(handle_history))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn(trace_requests))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Open the engine described by `config` and serve until Ctrl+C.
pub async fn start_server(
    config: EaselConfig,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = runtime::build_engine(&config)?;
    let state = Arc::new(AppState { engine });
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "easel listening");
    eprintln!("Easel listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    eprintln!("\nServer shut down.");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for Ctrl+C; serving until killed");
        std::future::pending::<()>().await;
    }
    eprintln!("\nReceived shutdown signal...");
}
