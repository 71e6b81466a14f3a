//! Change notifications pushed to subscribed sessions.

use serde::{Deserialize, Serialize};

use crate::key::Key;
use crate::request::Record;

/// Kind of committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change pushed to a session that has shown interest in the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub action: ChangeAction,
    pub bucket: String,
    pub key: Key,
    pub record: Record,
}

impl Notification {
    pub fn new(action: ChangeAction, bucket: impl Into<String>, key: Key, record: Record) -> Self {
        Self {
            action,
            bucket: bucket.into(),
            key,
            record,
        }
    }
}
