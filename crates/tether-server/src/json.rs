//! JSON bodies of the REST routes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_proto::{Key, Record, Relation, StoreRequest};

/// Login request.
#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub user: String,
    #[serde(alias = "passwd")]
    pub password: String,
}

/// Login response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: String,
    pub session_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Server status.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Always "ok" while serving.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Seconds since start.
    pub uptime_secs: u64,
    /// Live sessions.
    pub sessions: usize,
    /// Users with at least one live session.
    pub users: usize,
    /// Whether the WebSocket endpoint is served.
    pub websocket: bool,
}

/// Body of the write routes and of a conditional fetch.
///
/// `{"fetch": {...}}` carries a fetch request; otherwise the body describes a
/// write against the bucket and key in the path.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBody {
    #[serde(default)]
    pub fetch: Option<StoreRequest>,
    #[serde(default, alias = "recordData")]
    pub record: Option<Record>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub return_data: Option<Value>,
}

impl RecordBody {
    /// Build the write request for `bucket` and, when given, `key`.
    pub fn into_request(self, bucket: &str, key: Option<Key>) -> StoreRequest {
        StoreRequest {
            bucket: Some(bucket.to_string()),
            key,
            record: self.record,
            relations: self.relations,
            primary_key: self.primary_key,
            return_data: self.return_data,
            ..StoreRequest::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_record_body_into_request() {
        let body: RecordBody = serde_json::from_value(json!({
            "record": { "title": "a" },
            "relations": [
                { "bucket": "users", "type": "toOne", "propertyName": "owner", "keys": "ann" }
            ],
            "returnData": "r1"
        }))
        .unwrap();

        let request = body.into_request("tasks", Some(Key::number(3)));
        assert_eq!(request.bucket_name(), Some("tasks"));
        assert_eq!(request.key, Some(Key::number(3)));
        assert_eq!(request.relations.len(), 1);
        assert_eq!(request.return_data, Some(json!("r1")));
    }

    #[test]
    fn test_fetch_body() {
        let body: RecordBody = serde_json::from_value(json!({
            "fetch": { "conditions": "done = {d}", "parameters": { "d": true } }
        }))
        .unwrap();

        let fetch = body.fetch.unwrap();
        assert_eq!(fetch.conditions.as_deref(), Some("done = {d}"));
        assert!(body.record.is_none());
    }
}
