//! Collaborator traits the engine delegates to.
//!
//! The orchestrator never talks to a database, an access-control system, or
//! a credential store directly. It goes through these traits, so the server
//! can wire in whichever implementations it needs. Default implementations
//! live in [`crate::memstore`], [`crate::policy`], [`crate::auth`] and
//! [`crate::conditions`].

use async_trait::async_trait;
use tether_proto::{Key, Operation, Parameters, Record, StoreRequest};
use thiserror::Error;

use crate::session::UserData;

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend cannot be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the write.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

/// Persistent record storage.
///
/// `None` and `false` mean the addressed record does not exist.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// All records of a bucket matching the request's conditions.
    async fn fetch(&self, bucket: &str, request: &StoreRequest)
        -> Result<Vec<Record>, BackendError>;

    /// The current state of one record.
    async fn refresh(
        &self,
        bucket: &str,
        key: &Key,
        request: &StoreRequest,
    ) -> Result<Option<Record>, BackendError>;

    /// Create a record and return it as stored.
    async fn create(
        &self,
        bucket: &str,
        request: &StoreRequest,
    ) -> Result<Option<Record>, BackendError>;

    /// Update a record and return it as stored.
    async fn update(
        &self,
        bucket: &str,
        key: &Key,
        request: &StoreRequest,
    ) -> Result<Option<Record>, BackendError>;

    /// Delete a record.
    async fn delete(
        &self,
        bucket: &str,
        key: &Key,
        request: &StoreRequest,
    ) -> Result<bool, BackendError>;
}

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }
}

/// Authorization of store operations.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn check(
        &self,
        identity: &UserData,
        operation: Operation,
        request: &StoreRequest,
    ) -> PolicyDecision;
}

/// Credential verification.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Identity of the user if the password is correct.
    async fn check_auth(&self, user: &str, password: &str) -> Option<UserData>;
}

/// Evaluates a stored query's conditions against a record.
pub trait QueryPredicate: Send + Sync {
    fn evaluate(&self, conditions: &str, parameters: &Parameters, record: &Record) -> bool;
}

/// Predicate that accepts every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl QueryPredicate for AcceptAll {
    fn evaluate(&self, _conditions: &str, _parameters: &Parameters, _record: &Record) -> bool {
        true
    }
}
