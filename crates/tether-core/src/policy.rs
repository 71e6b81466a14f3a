//! Role based capability policy.
//!
//! Each role holds a set of capabilities:
//!
//! - `read:<scope>` allows fetch and refresh
//! - `write:<scope>` allows create and update
//! - `delete:<scope>` allows delete
//! - `admin` allows everything
//!
//! A scope is `*`, a bucket name, or a `prefix*` / `*suffix` pattern.
//!
//! # Configuration
//!
//! Set `TETHER_CAPABILITIES` with format:
//! ```text
//! role1:cap1,cap2;role2:cap3
//! ```
//!
//! # Example
//!
//! ```text
//! TETHER_CAPABILITIES="viewer:read:*;editor:read:*,write:task*;admin:admin"
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tether_proto::{Operation, StoreRequest};
use thiserror::Error;

use crate::backend::{PolicyDecision, PolicyEngine};
use crate::session::UserData;

/// Role assumed for identities without one.
pub const DEFAULT_ROLE: &str = "default";

/// Default environment variable holding the role table.
pub const CAPABILITIES_ENV: &str = "TETHER_CAPABILITIES";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("invalid capability format: {0}")]
    InvalidFormat(String),
}

/// Buckets a capability applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketScope {
    All,
    Bucket(String),
    /// `prefix*` or `*suffix`.
    Pattern(String),
}

impl BucketScope {
    fn parse(scope: Option<&str>) -> Self {
        match scope {
            None | Some("*") => BucketScope::All,
            Some(s) if s.contains('*') => BucketScope::Pattern(s.to_string()),
            Some(s) => BucketScope::Bucket(s.to_string()),
        }
    }

    pub fn matches(&self, bucket: &str) -> bool {
        match self {
            BucketScope::All => true,
            BucketScope::Bucket(name) => name == bucket,
            BucketScope::Pattern(pattern) => {
                if let Some(prefix) = pattern.strip_suffix('*') {
                    bucket.starts_with(prefix)
                } else if let Some(suffix) = pattern.strip_prefix('*') {
                    bucket.ends_with(suffix)
                } else {
                    bucket == pattern
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    Read(BucketScope),
    Write(BucketScope),
    Delete(BucketScope),
    Admin,
}

impl Capability {
    /// Parse `operation[:scope]`.
    pub fn parse(s: &str) -> Result<Self, CapabilityError> {
        let mut parts = s.trim().splitn(2, ':');
        let kind = parts.next().unwrap_or_default();
        let scope = parts.next().map(str::trim);

        match kind {
            "admin" => Ok(Capability::Admin),
            "read" => Ok(Capability::Read(BucketScope::parse(scope))),
            "write" => Ok(Capability::Write(BucketScope::parse(scope))),
            "delete" => Ok(Capability::Delete(BucketScope::parse(scope))),
            other => Err(CapabilityError::InvalidFormat(format!(
                "unknown capability type: {}",
                other
            ))),
        }
    }

    /// Whether this capability permits `operation` on `bucket`.
    pub fn permits(&self, operation: Operation, bucket: &str) -> bool {
        match (self, operation) {
            (Capability::Admin, _) => true,
            (Capability::Read(scope), Operation::Fetch | Operation::Refresh) => {
                scope.matches(bucket)
            }
            (Capability::Write(scope), Operation::Create | Operation::Update) => {
                scope.matches(bucket)
            }
            (Capability::Delete(scope), Operation::Delete) => scope.matches(bucket),
            _ => false,
        }
    }
}

/// [`PolicyEngine`] granting operations by role capabilities.
#[derive(Default)]
pub struct CapabilityPolicy {
    roles: RwLock<HashMap<String, Vec<Capability>>>,
}

impl CapabilityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a role a set of capabilities.
    pub fn grant(&self, role: impl Into<String>, capabilities: Vec<Capability>) {
        self.roles
            .write()
            .entry(role.into())
            .or_default()
            .extend(capabilities);
    }

    /// Parse a role table, `role:cap,cap;role2:cap`.
    pub fn parse_spec(spec: &str) -> Result<Self, CapabilityError> {
        let policy = Self::new();

        for role_spec in spec.split(';') {
            let role_spec = role_spec.trim();
            if role_spec.is_empty() {
                continue;
            }

            let (role, caps) = role_spec.split_once(':').ok_or_else(|| {
                CapabilityError::InvalidFormat(format!("missing capabilities for '{}'", role_spec))
            })?;
            let capabilities = caps
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Capability::parse)
                .collect::<Result<Vec<_>, _>>()?;

            policy.grant(role.trim(), capabilities);
        }

        Ok(policy)
    }

    /// Load the role table from an environment variable.
    ///
    /// A missing variable yields an empty policy, which denies everything. An
    /// invalid table is logged and also yields an empty policy.
    pub fn from_env(env_var: &str) -> Self {
        match std::env::var(env_var) {
            Ok(spec) => Self::parse_spec(&spec).unwrap_or_else(|e| {
                tracing::warn!(env_var, error = %e, "ignoring invalid capability table");
                Self::new()
            }),
            Err(_) => Self::new(),
        }
    }

    pub fn from_default_env() -> Self {
        Self::from_env(CAPABILITIES_ENV)
    }

    pub fn role_count(&self) -> usize {
        self.roles.read().len()
    }

    /// Whether `role` may perform `operation` on `bucket`.
    pub fn permits(&self, role: &str, operation: Operation, bucket: &str) -> bool {
        self.roles
            .read()
            .get(role)
            .is_some_and(|caps| caps.iter().any(|c| c.permits(operation, bucket)))
    }
}

#[async_trait]
impl PolicyEngine for CapabilityPolicy {
    async fn check(
        &self,
        identity: &UserData,
        operation: Operation,
        request: &StoreRequest,
    ) -> PolicyDecision {
        let role = identity.role.as_deref().unwrap_or(DEFAULT_ROLE);
        let bucket = request.bucket_name().unwrap_or_default();

        if self.permits(role, operation, bucket) {
            PolicyDecision::Allow
        } else {
            PolicyDecision::Deny(format!("role '{}' may not {} '{}'", role, operation, bucket))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capabilities() {
        assert_eq!(Capability::parse("admin").unwrap(), Capability::Admin);
        assert_eq!(Capability::parse("read").unwrap(), Capability::Read(BucketScope::All));
        assert_eq!(
            Capability::parse("write:tasks").unwrap(),
            Capability::Write(BucketScope::Bucket("tasks".into()))
        );
        assert_eq!(
            Capability::parse("delete:task*").unwrap(),
            Capability::Delete(BucketScope::Pattern("task*".into()))
        );
        assert!(Capability::parse("fly:*").is_err());
    }

    #[test]
    fn test_scope_patterns() {
        assert!(BucketScope::Pattern("task*".into()).matches("tasks"));
        assert!(!BucketScope::Pattern("task*".into()).matches("notes"));
        assert!(BucketScope::Pattern("*_log".into()).matches("audit_log"));
    }

    #[test]
    fn test_parse_spec() {
        let policy =
            CapabilityPolicy::parse_spec("viewer:read:*; editor:read:*,write:task*;root:admin")
                .unwrap();
        assert_eq!(policy.role_count(), 3);

        assert!(policy.permits("viewer", Operation::Fetch, "tasks"));
        assert!(!policy.permits("viewer", Operation::Create, "tasks"));
        assert!(policy.permits("editor", Operation::Update, "tasks"));
        assert!(!policy.permits("editor", Operation::Update, "notes"));
        assert!(!policy.permits("editor", Operation::Delete, "tasks"));
        assert!(policy.permits("root", Operation::Delete, "anything"));
        assert!(!policy.permits("nobody", Operation::Fetch, "tasks"));

        assert!(CapabilityPolicy::parse_spec("broken").is_err());
    }

    #[tokio::test]
    async fn test_check_uses_default_role() {
        let policy = CapabilityPolicy::parse_spec("default:read:*").unwrap();
        let request = StoreRequest::new("tasks");

        let anon = UserData::new("ann");
        assert!(policy.check(&anon, Operation::Fetch, &request).await.is_allowed());

        let decision = policy.check(&anon, Operation::Delete, &request).await;
        assert!(matches!(decision, PolicyDecision::Deny(_)));

        let editor = UserData::new("bob").with_role("editor");
        assert!(!policy.check(&editor, Operation::Fetch, &request).await.is_allowed());
    }
}
