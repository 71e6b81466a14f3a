//! WebSocket frames exchanged between client and server.
//!
//! Every frame is a JSON object tagged by its `type` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, ProtoError};
use crate::key::Key;
use crate::notification::Notification;
use crate::request::{Operation, Record, StoreRequest};

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Open a new session with credentials.
    Auth {
        user: String,
        #[serde(alias = "passwd")]
        password: String,
    },
    /// Reattach to an existing session.
    Resume {
        user: String,
        #[serde(rename = "sessionKey")]
        session_key: String,
    },
    Fetch(StoreRequest),
    RefreshRecord(StoreRequest),
    CreateRecord(StoreRequest),
    UpdateRecord(StoreRequest),
    DeleteRecord(StoreRequest),
    /// End the session.
    Logout {
        user: String,
        #[serde(rename = "sessionKey")]
        session_key: String,
    },
}

impl ClientMessage {
    /// Decode a text frame.
    pub fn from_json(text: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Split a store-request frame into its operation and request.
    ///
    /// Returns `Err(self)` for frames that are not store requests.
    pub fn into_store_request(self) -> Result<(Operation, StoreRequest), Self> {
        match self {
            ClientMessage::Fetch(r) => Ok((Operation::Fetch, r)),
            ClientMessage::RefreshRecord(r) => Ok((Operation::Refresh, r)),
            ClientMessage::CreateRecord(r) => Ok((Operation::Create, r)),
            ClientMessage::UpdateRecord(r) => Ok((Operation::Update, r)),
            ClientMessage::DeleteRecord(r) => Ok((Operation::Delete, r)),
            other => Err(other),
        }
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    AuthSuccess {
        user: String,
        #[serde(rename = "sessionKey")]
        session_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    AuthError {
        message: String,
    },
    FetchResult {
        bucket: String,
        records: Vec<Record>,
        #[serde(rename = "returnData", default, skip_serializing_if = "Option::is_none")]
        return_data: Option<Value>,
    },
    RefreshResult {
        bucket: String,
        key: Key,
        record: Record,
        #[serde(rename = "returnData", default, skip_serializing_if = "Option::is_none")]
        return_data: Option<Value>,
    },
    CreateResult {
        bucket: String,
        key: Key,
        record: Record,
        #[serde(rename = "returnData", default, skip_serializing_if = "Option::is_none")]
        return_data: Option<Value>,
    },
    UpdateResult {
        bucket: String,
        key: Key,
        record: Record,
        #[serde(rename = "returnData", default, skip_serializing_if = "Option::is_none")]
        return_data: Option<Value>,
    },
    DeleteResult {
        bucket: String,
        key: Key,
        #[serde(rename = "returnData", default, skip_serializing_if = "Option::is_none")]
        return_data: Option<Value>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<Operation>,
        code: ErrorKind,
        message: String,
        #[serde(rename = "returnData", default, skip_serializing_if = "Option::is_none")]
        return_data: Option<Value>,
    },
    LogoutSuccess,
    LogoutError {
        message: String,
    },
    Notification(Notification),
}

impl ServerMessage {
    /// Encode as a text frame.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Build an error frame.
    pub fn error(
        action: Option<Operation>,
        code: ErrorKind,
        message: impl Into<String>,
        return_data: Option<Value>,
    ) -> Self {
        ServerMessage::Error {
            action,
            code,
            message: message.into(),
            return_data,
        }
    }
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        ServerMessage::Notification(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::ChangeAction;
    use serde_json::json;

    #[test]
    fn test_decode_store_request_frame() {
        let msg = ClientMessage::from_json(
            r#"{"type":"createRecord","bucket":"tasks","record":{"title":"a"},"returnData":5}"#,
        )
        .unwrap();
        let (op, request) = msg.into_store_request().unwrap();
        assert_eq!(op, Operation::Create);
        assert_eq!(request.bucket_name(), Some("tasks"));
        assert_eq!(request.return_data, Some(json!(5)));
    }

    #[test]
    fn test_decode_auth_frame_with_legacy_field() {
        let msg =
            ClientMessage::from_json(r#"{"type":"auth","user":"ann","passwd":"pw"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Auth {
                user: "ann".to_string(),
                password: "pw".to_string()
            }
        );
        assert!(msg.into_store_request().is_err());
    }

    #[test]
    fn test_unknown_frame_is_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"explode"}"#).is_err());
    }

    #[test]
    fn test_encode_notification_frame() {
        let mut record = Record::new();
        record.insert("title".to_string(), json!("a"));
        let msg = ServerMessage::from(Notification::new(
            ChangeAction::Update,
            "tasks",
            Key::number(7),
            record,
        ));

        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "notification",
                "action": "update",
                "bucket": "tasks",
                "key": 7,
                "record": { "title": "a" }
            })
        );
    }

    #[test]
    fn test_encode_error_frame() {
        let msg = ServerMessage::error(
            Some(Operation::Delete),
            ErrorKind::PolicyDenied,
            "not allowed",
            Some(json!("r1")),
        );
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "error",
                "action": "delete",
                "code": "POLICY_DENIED",
                "message": "not allowed",
                "returnData": "r1"
            })
        );
    }
}
