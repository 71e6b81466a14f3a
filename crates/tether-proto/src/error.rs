//! Error types for the wire protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire tag of an error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The request is malformed or incomplete.
    DataInconsistency,
    /// The policy engine refused the operation.
    PolicyDenied,
    /// The storage backend found nothing or failed.
    StorageFailure,
    /// The session is unknown, expired, or does not match the user.
    SessionInvalid,
    /// Policy or storage did not answer within the request deadline.
    Timeout,
    /// Credentials were rejected.
    AuthFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DataInconsistency => "DATA_INCONSISTENCY",
            ErrorKind::PolicyDenied => "POLICY_DENIED",
            ErrorKind::StorageFailure => "STORAGE_FAILURE",
            ErrorKind::SessionInvalid => "SESSION_INVALID",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::AuthFailed => "AUTH_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while decoding or encoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),
}
