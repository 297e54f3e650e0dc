use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::handlers::AppState;

/// Liveness: the process is up.
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "up" }))
}

/// Readiness: the database answers a ping.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health))
        .route("/ready", get(ready))
}
