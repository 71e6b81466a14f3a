//! Core error types.

use tether_proto::ErrorKind;
use thiserror::Error;

use crate::backend::BackendError;

/// Errors produced while handling a store request.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request is malformed or incomplete.
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),

    /// The policy engine refused the operation.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// The storage backend found nothing.
    #[error("storage failure: {0}")]
    NotFound(String),

    /// The storage backend failed.
    #[error("storage failure: {0}")]
    Backend(#[from] BackendError),

    /// The session is unknown or expired.
    #[error("session invalid: {0}")]
    SessionInvalid(String),

    /// Policy or storage exceeded the request deadline.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Credentials were rejected.
    #[error("authentication failed")]
    AuthFailed,
}

impl SyncError {
    /// Wire tag reported to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::DataInconsistency(_) => ErrorKind::DataInconsistency,
            SyncError::PolicyDenied(_) => ErrorKind::PolicyDenied,
            SyncError::NotFound(_) | SyncError::Backend(_) => ErrorKind::StorageFailure,
            SyncError::SessionInvalid(_) => ErrorKind::SessionInvalid,
            SyncError::Timeout(_) => ErrorKind::Timeout,
            SyncError::AuthFailed => ErrorKind::AuthFailed,
        }
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SyncError::NotFound("tasks/7".into()).kind(),
            ErrorKind::StorageFailure
        );
        assert_eq!(
            SyncError::Backend(BackendError::Unavailable("down".into())).kind(),
            ErrorKind::StorageFailure
        );
        assert_eq!(SyncError::Timeout("storage").kind(), ErrorKind::Timeout);
        assert_eq!(SyncError::Timeout("policy").to_string(), "policy timed out");
    }
}
