//! Error handling for the server.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tether_core::SyncError;
use tether_proto::ErrorKind;

/// Errors that stop the server itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Error returned by a route handler.
#[derive(Debug)]
pub enum AppError {
    /// A request that failed in the sync core.
    Sync(SyncError),
    /// Malformed request body or parameters.
    BadRequest(String),
    /// Missing or unknown session.
    Unauthorized(String),
}

/// Error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::DataInconsistency => StatusCode::BAD_REQUEST,
        ErrorKind::PolicyDenied | ErrorKind::SessionInvalid | ErrorKind::AuthFailed => {
            StatusCode::FORBIDDEN
        }
        ErrorKind::StorageFailure => StatusCode::NOT_FOUND,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl AppError {
    fn kind(&self) -> ErrorKind {
        match self {
            AppError::Sync(e) => e.kind(),
            AppError::BadRequest(_) => ErrorKind::DataInconsistency,
            AppError::Unauthorized(_) => ErrorKind::SessionInvalid,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match self {
            AppError::Sync(e) => e.to_string(),
            AppError::BadRequest(msg) | AppError::Unauthorized(msg) => msg,
        };

        let body = ErrorResponse {
            error: true,
            code: kind.as_str().to_string(),
            message,
        };

        (status_for(kind), Json(body)).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        AppError::Sync(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("JSON error: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::DataInconsistency), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::PolicyDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::SessionInvalid), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::AuthFailed), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::StorageFailure), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_sync_error_response() {
        let response = AppError::from(SyncError::PolicyDenied("no".into())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = AppError::Unauthorized("missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
