//! Server status endpoint.

use axum::{extract::State, routing::get, Json, Router};

use crate::json::StatusResponse;
use crate::AppState;

/// Status routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

/// Status handler. Needs no session.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        sessions: state.registry.session_count(),
        users: state.registry.user_count(),
        websocket: !state.config.rest_only,
    })
}
