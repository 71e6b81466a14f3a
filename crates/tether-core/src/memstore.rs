//! In-memory storage backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tether_proto::{Key, Record, StoreRequest};

use crate::backend::{BackendError, QueryPredicate, StorageBackend};
use crate::conditions::ConditionsEvaluator;
use crate::mutation::{ensure_key_field, materialize_relations};

#[derive(Default)]
struct Bucket {
    records: BTreeMap<Key, Record>,
    next_key: i64,
}

impl Bucket {
    /// Next free integer key.
    fn allocate_key(&mut self) -> Key {
        loop {
            self.next_key += 1;
            let key = Key::number(self.next_key);
            if !self.records.contains_key(&key) {
                return key;
            }
        }
    }
}

/// [`StorageBackend`] holding every bucket in memory.
///
/// Creates without a key get sequential integer keys. Updates merge the given
/// fields into the stored record. Relations are stored as record fields.
/// Fetch and refresh honor the request's `properties`.
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, Bucket>>,
    predicate: Arc<dyn QueryPredicate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_predicate(Arc::new(ConditionsEvaluator::new()))
    }

    /// Use a custom predicate to filter fetches.
    pub fn with_predicate(predicate: Arc<dyn QueryPredicate>) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            predicate,
        }
    }

    /// Insert a record directly, bypassing request handling.
    pub fn insert(&self, bucket: &str, key: Key, record: Record) {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .records
            .insert(key, record);
    }

    pub fn len(&self, bucket: &str) -> usize {
        self.buckets.read().get(bucket).map_or(0, |b| b.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.read().values().all(|b| b.records.is_empty())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    async fn fetch(
        &self,
        bucket: &str,
        request: &StoreRequest,
    ) -> Result<Vec<Record>, BackendError> {
        let buckets = self.buckets.read();
        let Some(stored) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };

        let conditions = request.conditions.as_deref().filter(|c| !c.trim().is_empty());
        let records = stored
            .records
            .values()
            .filter(|record| match conditions {
                Some(c) => self.predicate.evaluate(c, &request.parameters, record),
                None => true,
            })
            .map(|record| request.project(record.clone()))
            .collect();
        Ok(records)
    }

    async fn refresh(
        &self,
        bucket: &str,
        key: &Key,
        request: &StoreRequest,
    ) -> Result<Option<Record>, BackendError> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .and_then(|b| b.records.get(key))
            .map(|record| request.project(record.clone())))
    }

    async fn create(
        &self,
        bucket: &str,
        request: &StoreRequest,
    ) -> Result<Option<Record>, BackendError> {
        let mut record = request.record.clone().unwrap_or_default();
        materialize_relations(&mut record, &request.relations);

        let mut buckets = self.buckets.write();
        let stored = buckets.entry(bucket.to_string()).or_default();

        let key = match request.record_key() {
            Some(key) if stored.records.contains_key(&key) => {
                return Err(BackendError::Rejected(format!(
                    "{}/{} already exists",
                    bucket, key
                )));
            }
            Some(key) => key,
            None => stored.allocate_key(),
        };

        ensure_key_field(&mut record, request.primary_key_field(), &key);
        stored.records.insert(key, record.clone());
        Ok(Some(record))
    }

    async fn update(
        &self,
        bucket: &str,
        key: &Key,
        request: &StoreRequest,
    ) -> Result<Option<Record>, BackendError> {
        let mut buckets = self.buckets.write();
        let Some(existing) = buckets.get_mut(bucket).and_then(|b| b.records.get_mut(key)) else {
            return Ok(None);
        };

        if let Some(changes) = &request.record {
            for (field, value) in changes {
                existing.insert(field.clone(), value.clone());
            }
        }
        materialize_relations(existing, &request.relations);
        existing.insert(request.primary_key_field().to_string(), key.to_value());

        Ok(Some(existing.clone()))
    }

    async fn delete(
        &self,
        bucket: &str,
        key: &Key,
        _request: &StoreRequest,
    ) -> Result<bool, BackendError> {
        Ok(self
            .buckets
            .write()
            .get_mut(bucket)
            .and_then(|b| b.records.remove(key))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_proto::{Parameters, Relation};

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_keys() {
        let store = MemoryStore::new();
        let request = StoreRequest::new("tasks").with_record(record(json!({ "title": "a" })));

        let first = store.create("tasks", &request).await.unwrap().unwrap();
        let second = store.create("tasks", &request).await.unwrap().unwrap();
        assert_eq!(first["key"], json!(1));
        assert_eq!(second["key"], json!(2));
        assert_eq!(store.len("tasks"), 2);
    }

    #[tokio::test]
    async fn test_create_with_existing_key_is_rejected() {
        let store = MemoryStore::new();
        let request = StoreRequest::new("tasks").with_record(record(json!({ "key": "a" })));

        assert!(store.create("tasks", &request).await.is_ok());
        assert!(matches!(
            store.create("tasks", &request).await,
            Err(BackendError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new();
        store.insert(
            "tasks",
            Key::number(1),
            record(json!({ "key": 1, "title": "a", "done": false })),
        );

        let request = StoreRequest::new("tasks")
            .with_key(1)
            .with_record(record(json!({ "done": true })))
            .with_relation(Relation::to_one("users", "owner", Some(Key::string("ann"))));
        let updated = store.update("tasks", &Key::number(1), &request).await.unwrap().unwrap();

        assert_eq!(
            serde_json::Value::Object(updated),
            json!({ "key": 1, "title": "a", "done": true, "owner": "ann" })
        );
        assert!(store
            .update("tasks", &Key::number(9), &request)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fetch_filters_by_conditions() {
        let store = MemoryStore::new();
        store.insert("tasks", Key::number(1), record(json!({ "key": 1, "done": true })));
        store.insert("tasks", Key::number(2), record(json!({ "key": 2, "done": false })));

        let all = store.fetch("tasks", &StoreRequest::new("tasks")).await.unwrap();
        assert_eq!(all.len(), 2);

        let request = StoreRequest::new("tasks").with_conditions("done = true", Parameters::new());
        let open = store.fetch("tasks", &request).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0]["key"], json!(1));

        assert!(store.fetch("notes", &StoreRequest::new("notes")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_and_refresh_return_requested_properties() {
        let store = MemoryStore::new();
        store.insert(
            "tasks",
            Key::number(1),
            record(json!({ "key": 1, "title": "a", "done": true, "notes": "x" })),
        );
        store.insert(
            "tasks",
            Key::number(2),
            record(json!({ "key": 2, "title": "b", "done": false, "notes": "y" })),
        );

        let request = StoreRequest::new("tasks")
            .with_conditions("done = true", Parameters::new())
            .with_properties(["title"]);
        let fetched = store.fetch("tasks", &request).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(
            serde_json::Value::Object(fetched[0].clone()),
            json!({ "key": 1, "title": "a" })
        );

        let request = StoreRequest::new("tasks").with_key(2).with_properties(["done"]);
        let refreshed = store
            .refresh("tasks", &Key::number(2), &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::Value::Object(refreshed),
            json!({ "key": 2, "done": false })
        );
    }

    #[tokio::test]
    async fn test_refresh_and_delete() {
        let store = MemoryStore::new();
        store.insert("tasks", Key::number(7), record(json!({ "key": 7 })));
        let request = StoreRequest::new("tasks").with_key(7);

        assert!(store.refresh("tasks", &Key::string("7"), &request).await.unwrap().is_some());
        assert!(store.delete("tasks", &Key::number(7), &request).await.unwrap());
        assert!(!store.delete("tasks", &Key::number(7), &request).await.unwrap());
        assert!(store.refresh("tasks", &Key::number(7), &request).await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
