use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Reports whether the session store is reachable.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Response {
    match state.cache.ping().await {
        Ok(()) => Json(HealthResponse { status: "ok" }).into_response(),
        Err(e) => {
            tracing::error!("❌ Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "degraded" }),
            )
                .into_response()
        }
    }
}
