//! Request orchestration: validate, authorize, execute, reply, distribute.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tether_proto::{Key, Operation, Record, ServerMessage, StoreRequest};

use crate::backend::{PolicyDecision, PolicyEngine, StorageBackend};
use crate::config::OrchestratorConfig;
use crate::distributor::{ChangeDistributor, DistributionReport};
use crate::error::SyncError;
use crate::mutation::{ensure_key_field, materialize_relations, StoreMutation};
use crate::session::{SessionId, SessionRegistry};

/// Successful outcome of a store request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Result of a fetch.
    Records { bucket: String, records: Vec<Record> },
    /// Result of a refresh, create or update.
    Record {
        operation: Operation,
        bucket: String,
        key: Key,
        record: Record,
    },
    /// Result of a delete.
    Deleted { bucket: String, key: Key },
}

impl Reply {
    /// Frame sent back to the requesting client.
    pub fn into_message(self, return_data: Option<Value>) -> ServerMessage {
        match self {
            Reply::Records { bucket, records } => ServerMessage::FetchResult {
                bucket,
                records,
                return_data,
            },
            Reply::Record {
                operation,
                bucket,
                key,
                record,
            } => match operation {
                Operation::Create => ServerMessage::CreateResult {
                    bucket,
                    key,
                    record,
                    return_data,
                },
                Operation::Update => ServerMessage::UpdateResult {
                    bucket,
                    key,
                    record,
                    return_data,
                },
                _ => ServerMessage::RefreshResult {
                    bucket,
                    key,
                    record,
                    return_data,
                },
            },
            Reply::Deleted { bucket, key } => ServerMessage::DeleteResult {
                bucket,
                key,
                return_data,
            },
        }
    }
}

/// Validated addressing of a request.
struct Target {
    bucket: String,
    key: Option<Key>,
}

/// Drives a store request through policy, storage and distribution.
pub struct RequestOrchestrator {
    registry: Arc<SessionRegistry>,
    distributor: Arc<ChangeDistributor>,
    storage: Arc<dyn StorageBackend>,
    policy: Option<Arc<dyn PolicyEngine>>,
    config: OrchestratorConfig,
}

impl RequestOrchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        distributor: Arc<ChangeDistributor>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            registry,
            distributor,
            storage,
            policy: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Authorize every request through `policy`. Without one, all requests
    /// are allowed.
    pub fn with_policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handle a request from an already validated session.
    ///
    /// `reply` is called exactly once. For writes it is called before the
    /// change is distributed to other sessions.
    pub async fn handle<F>(
        &self,
        origin: &SessionId,
        operation: Operation,
        request: StoreRequest,
        reply: F,
    ) -> Option<DistributionReport>
    where
        F: FnOnce(Result<Reply, SyncError>) + Send,
    {
        match self.process(origin, operation, &request).await {
            Ok((response, mutation)) => {
                reply(Ok(response));
                mutation.map(|m| self.distributor.distribute(&m))
            }
            Err(e) => {
                tracing::debug!(
                    user = %origin.user,
                    operation = %operation,
                    bucket = request.bucket.as_deref().unwrap_or_default(),
                    error = %e,
                    "request failed"
                );
                reply(Err(e));
                None
            }
        }
    }

    /// Handle a request and return its reply. Any resulting change has been
    /// distributed by the time this returns.
    pub async fn execute(
        &self,
        origin: &SessionId,
        operation: Operation,
        request: StoreRequest,
    ) -> Result<Reply, SyncError> {
        let (response, mutation) = self.process(origin, operation, &request).await?;
        if let Some(mutation) = mutation {
            self.distributor.distribute(&mutation);
        }
        Ok(response)
    }

    async fn process(
        &self,
        origin: &SessionId,
        operation: Operation,
        request: &StoreRequest,
    ) -> Result<(Reply, Option<StoreMutation>), SyncError> {
        let target = validate(operation, request)?;
        self.authorize(origin, operation, request).await?;

        let bucket = target.bucket;
        match operation {
            Operation::Fetch => {
                let records = self
                    .bounded("storage", self.storage.fetch(&bucket, request))
                    .await??;
                self.registry.record_query(
                    origin,
                    &bucket,
                    request.conditions.clone(),
                    request.parameters.clone(),
                );
                Ok((Reply::Records { bucket, records }, None))
            }
            Operation::Refresh => {
                let key = required_key(target.key)?;
                let record = self
                    .bounded("storage", self.storage.refresh(&bucket, &key, request))
                    .await??
                    .ok_or_else(|| not_found(&bucket, &key))?;
                self.registry
                    .record_key(origin, &bucket, &key, self.registry.now());
                let reply = Reply::Record {
                    operation,
                    bucket,
                    key,
                    record,
                };
                Ok((reply, None))
            }
            Operation::Create => {
                let record = self
                    .bounded("storage", self.storage.create(&bucket, request))
                    .await??
                    .ok_or_else(|| {
                        SyncError::NotFound(format!("{}: nothing was created", bucket))
                    })?;
                let key = request.key_of(&record).ok_or_else(|| {
                    SyncError::NotFound(format!("{}: created record has no key", bucket))
                })?;
                self.commit(origin, operation, request, bucket, key, record)
            }
            Operation::Update => {
                let key = required_key(target.key)?;
                let record = self
                    .bounded("storage", self.storage.update(&bucket, &key, request))
                    .await??
                    .ok_or_else(|| not_found(&bucket, &key))?;
                self.commit(origin, operation, request, bucket, key, record)
            }
            Operation::Delete => {
                let key = required_key(target.key)?;
                let deleted = self
                    .bounded("storage", self.storage.delete(&bucket, &key, request))
                    .await??;
                if !deleted {
                    return Err(not_found(&bucket, &key));
                }

                self.registry.forget_key(origin, &bucket, &key);
                let mutation = StoreMutation {
                    action: tether_proto::ChangeAction::Delete,
                    bucket: bucket.clone(),
                    key: key.clone(),
                    record: request.record.clone().unwrap_or_default(),
                    origin: origin.clone(),
                    committed_at: self.registry.now(),
                };
                Ok((Reply::Deleted { bucket, key }, Some(mutation)))
            }
        }
    }

    /// Finish a create or update: merge relations, track the key on the
    /// originator and build the mutation.
    fn commit(
        &self,
        origin: &SessionId,
        operation: Operation,
        request: &StoreRequest,
        bucket: String,
        key: Key,
        mut record: Record,
    ) -> Result<(Reply, Option<StoreMutation>), SyncError> {
        let Some(action) = operation.change_action() else {
            return Err(SyncError::DataInconsistency(format!(
                "{} does not change data",
                operation
            )));
        };

        materialize_relations(&mut record, &request.relations);
        ensure_key_field(&mut record, request.primary_key_field(), &key);

        let now = self.registry.now();
        self.registry.record_key(origin, &bucket, &key, now);

        let mutation = StoreMutation {
            action,
            bucket: bucket.clone(),
            key: key.clone(),
            record: record.clone(),
            origin: origin.clone(),
            committed_at: now,
        };
        let reply = Reply::Record {
            operation,
            bucket,
            key,
            record,
        };
        Ok((reply, Some(mutation)))
    }

    async fn authorize(
        &self,
        origin: &SessionId,
        operation: Operation,
        request: &StoreRequest,
    ) -> Result<(), SyncError> {
        let Some(policy) = &self.policy else {
            return Ok(());
        };

        let identity = self
            .registry
            .user_data(origin)
            .ok_or_else(|| SyncError::SessionInvalid(format!("no session for {}", origin.user)))?;

        match self
            .bounded("policy", policy.check(&identity, operation, request))
            .await?
        {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny(reason) => {
                tracing::info!(
                    user = %origin.user,
                    operation = %operation,
                    %reason,
                    "policy denied"
                );
                Err(SyncError::PolicyDenied(reason))
            }
        }
    }

    async fn bounded<T>(
        &self,
        stage: &'static str,
        future: impl Future<Output = T>,
    ) -> Result<T, SyncError> {
        tokio::time::timeout(self.config.request_timeout, future)
            .await
            .map_err(|_| {
                tracing::warn!(
                    stage,
                    timeout = ?self.config.request_timeout,
                    "request deadline exceeded"
                );
                SyncError::Timeout(stage)
            })
    }
}

/// Check that a request carries what its operation needs.
fn validate(operation: Operation, request: &StoreRequest) -> Result<Target, SyncError> {
    let bucket = request
        .bucket_name()
        .ok_or_else(|| SyncError::DataInconsistency("bucket is missing".to_string()))?
        .to_string();

    let key = request.record_key();
    if operation.requires_key() && key.is_none() {
        return Err(SyncError::DataInconsistency(format!(
            "{} on {} requires a key",
            operation, bucket
        )));
    }

    if operation.requires_record() && request.record.is_none() {
        let message = match operation {
            Operation::Delete => format!("delete on {} requires the record being deleted", bucket),
            _ => format!("{} on {} requires record data", operation, bucket),
        };
        return Err(SyncError::DataInconsistency(message));
    }

    Ok(Target { bucket, key })
}

fn required_key(key: Option<Key>) -> Result<Key, SyncError> {
    key.ok_or_else(|| SyncError::DataInconsistency("key is missing".to_string()))
}

fn not_found(bucket: &str, key: &Key) -> SyncError {
    SyncError::NotFound(format!("{}/{} not found", bucket, key))
}
