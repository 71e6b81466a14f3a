//! Authenticated sessions and their delivery state.

mod key;
mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use key::generate_session_key;
pub use registry::{PushOutcome, SessionRegistry};

/// Identity of a session: the user plus a random session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    pub user: String,
    pub key: String,
}

impl SessionId {
    pub fn new(user: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for SessionId {
    // Only a key prefix is shown so logs never carry a usable session key.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.key.chars().take(8).collect();
        write!(f, "{}/{}", self.user, prefix)
    }
}

/// Authenticated identity attached to a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl UserData {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}
