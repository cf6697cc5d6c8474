//! Health and readiness handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// GET /health — liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /ready — readiness probe; verifies the queue backend is reachable
/// and reports queue depth.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.queue.len().await {
        Ok((high, normal)) => {
            let dlq = state.queue.dlq_len().await.unwrap_or(0);
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ready",
                    "queue": { "high": high, "normal": normal, "dlq": dlq },
                })),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "detail": e.to_string() })),
        ),
    }
}
