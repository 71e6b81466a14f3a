//! Temporary URLs registered through [`TemporaryUrls`](tether_core::TemporaryUrls).

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::Value;

use crate::AppState;

/// Temporary URL routes. Need no session.
pub fn routes() -> Router<AppState> {
    Router::new().route("/tmp/:bucket/:key", get(temporary))
}

/// Serve a registered resource, consuming one use.
async fn temporary(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    let Some(resource) = state.temp_urls.get(&bucket, &key) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // Non-JSON string data is sent as is.
    let body = match resource.data {
        Value::String(text) if resource.mime_type != "application/json" => text,
        data => data.to_string(),
    };
    ([(header::CONTENT_TYPE, resource.mime_type)], body).into_response()
}
