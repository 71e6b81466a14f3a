//! REST access to buckets.
//!
//! Each route maps onto one store operation run for the calling session.
//! REST sessions have no push channel: changes made by others are queued
//! until a WebSocket resumes the session.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};
use tether_proto::{Key, Operation, ServerMessage, StoreRequest};

use crate::error::AppError;
use crate::json::RecordBody;
use crate::session::CurrentSession;
use crate::AppState;

/// Bucket routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:bucket", get(fetch_all).post(fetch_or_create))
        .route("/:bucket/:key", get(refresh).put(update).delete(delete))
}

type JsonResult = Result<Json<ServerMessage>, AppError>;

async fn fetch_all(
    State(state): State<AppState>,
    CurrentSession(id): CurrentSession,
    Path(bucket): Path<String>,
) -> JsonResult {
    run(&state, &id, Operation::Fetch, StoreRequest::new(bucket)).await
}

async fn refresh(
    State(state): State<AppState>,
    CurrentSession(id): CurrentSession,
    Path((bucket, key)): Path<(String, String)>,
) -> JsonResult {
    let request = StoreRequest::new(bucket).with_key(Key::parse(&key));
    run(&state, &id, Operation::Refresh, request).await
}

/// `{"fetch": {...}}` runs a conditional fetch; any other body creates a record.
async fn fetch_or_create(
    State(state): State<AppState>,
    CurrentSession(id): CurrentSession,
    Path(bucket): Path<String>,
    body: Result<Json<RecordBody>, JsonRejection>,
) -> JsonResult {
    let mut body = body_or_default(body)?;
    match body.fetch.take() {
        Some(mut fetch) => {
            fetch.bucket = Some(bucket);
            run(&state, &id, Operation::Fetch, fetch).await
        }
        None => {
            let request = body.into_request(&bucket, None);
            run(&state, &id, Operation::Create, request).await
        }
    }
}

async fn update(
    State(state): State<AppState>,
    CurrentSession(id): CurrentSession,
    Path((bucket, key)): Path<(String, String)>,
    body: Result<Json<RecordBody>, JsonRejection>,
) -> JsonResult {
    let request = body_or_default(body)?.into_request(&bucket, Some(Key::parse(&key)));
    run(&state, &id, Operation::Update, request).await
}

/// The body carries the record snapshot that other sessions are told about.
async fn delete(
    State(state): State<AppState>,
    CurrentSession(id): CurrentSession,
    Path((bucket, key)): Path<(String, String)>,
    body: Result<Json<RecordBody>, JsonRejection>,
) -> JsonResult {
    let request = body_or_default(body)?.into_request(&bucket, Some(Key::parse(&key)));
    run(&state, &id, Operation::Delete, request).await
}

/// A missing body is empty; a malformed one is rejected.
fn body_or_default(body: Result<Json<RecordBody>, JsonRejection>) -> Result<RecordBody, AppError> {
    match body {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(RecordBody::default()),
        Err(rejection) => Err(rejection.into()),
    }
}

async fn run(
    state: &AppState,
    id: &tether_core::SessionId,
    operation: Operation,
    request: StoreRequest,
) -> JsonResult {
    let return_data = request.return_data.clone();
    let reply = state.orchestrator.execute(id, operation, request).await?;
    Ok(Json(reply.into_message(return_data)))
}
