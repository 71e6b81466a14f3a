//! Temporary resources served under a one-off URL.
//!
//! A resource is registered under a bucket and key and stays retrievable
//! until its [`UrlLimit`] runs out or it is destroyed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};

/// How long a temporary resource stays available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlLimit {
    /// Number of retrievals left. Zero means unlimited.
    Uses(u32),
    /// Available until this time, in milliseconds since the epoch.
    Until(u64),
}

/// A registered resource.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporaryResource {
    pub data: Value,
    pub mime_type: String,
    pub limit: UrlLimit,
}

impl TemporaryResource {
    /// JSON data retrievable `uses` times (zero for unlimited).
    pub fn json(data: Value, uses: u32) -> Self {
        Self {
            data,
            mime_type: "application/json".to_string(),
            limit: UrlLimit::Uses(uses),
        }
    }

    /// JSON data retrievable until `expires_at` milliseconds.
    pub fn json_until(data: Value, expires_at: u64) -> Self {
        Self {
            data,
            mime_type: "application/json".to_string(),
            limit: UrlLimit::Until(expires_at),
        }
    }
}

/// Registry of temporary resources keyed by `bucket/key`.
pub struct TemporaryUrls {
    resources: Mutex<HashMap<(String, String), TemporaryResource>>,
    clock: Arc<dyn Clock>,
}

impl TemporaryUrls {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Register a resource, replacing any previous one at the same address.
    pub fn register(&self, bucket: &str, key: &str, resource: TemporaryResource) {
        tracing::debug!(bucket, key, limit = ?resource.limit, "registered temporary url");
        self.resources
            .lock()
            .insert((bucket.to_string(), key.to_string()), resource);
    }

    /// Retrieve a resource, consuming one use. Exhausted or expired resources
    /// are removed and yield `None`.
    pub fn get(&self, bucket: &str, key: &str) -> Option<TemporaryResource> {
        let address = (bucket.to_string(), key.to_string());
        let now = self.clock.now_millis();
        let mut resources = self.resources.lock();
        let resource = resources.get_mut(&address)?;
        let limit = resource.limit;

        match limit {
            UrlLimit::Uses(0) => Some(resource.clone()),
            UrlLimit::Uses(1) => resources.remove(&address),
            UrlLimit::Uses(left) => {
                resource.limit = UrlLimit::Uses(left - 1);
                Some(resource.clone())
            }
            UrlLimit::Until(expires_at) if now < expires_at => Some(resource.clone()),
            UrlLimit::Until(_) => {
                resources.remove(&address);
                None
            }
        }
    }

    /// Remove a resource. Returns whether it existed.
    pub fn destroy(&self, bucket: &str, key: &str) -> bool {
        self.resources
            .lock()
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some()
    }

    /// Drop every resource past its deadline. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut resources = self.resources.lock();
        let before = resources.len();
        resources.retain(|_, r| !matches!(r.limit, UrlLimit::Until(at) if now >= at));
        before - resources.len()
    }

    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }
}

impl Default for TemporaryUrls {
    fn default() -> Self {
        Self::new()
    }
}
