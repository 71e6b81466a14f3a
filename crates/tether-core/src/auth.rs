//! Static user table authentication.
//!
//! # Configuration
//!
//! Set `TETHER_USERS` with format:
//! ```text
//! user1:password1[:role];user2:password2[:role]
//! ```
//!
//! Passwords are held only as BLAKE3 digests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::backend::Authenticator;
use crate::session::UserData;

/// Default environment variable holding the user table.
pub const USERS_ENV: &str = "TETHER_USERS";

struct UserEntry {
    digest: blake3::Hash,
    role: Option<String>,
}

/// [`Authenticator`] over a fixed user table.
#[derive(Default)]
pub struct StaticAuthenticator {
    users: RwLock<HashMap<String, UserEntry>>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    pub fn add_user(&self, user: impl Into<String>, password: &str, role: Option<String>) {
        let entry = UserEntry {
            digest: blake3::hash(password.as_bytes()),
            role,
        };
        self.users.write().insert(user.into(), entry);
    }

    /// Remove a user.
    pub fn remove_user(&self, user: &str) -> bool {
        self.users.write().remove(user).is_some()
    }

    /// Parse a user table. Malformed entries are skipped.
    pub fn parse_spec(spec: &str) -> Self {
        let auth = Self::new();

        for user_spec in spec.split(';') {
            let user_spec = user_spec.trim();
            if user_spec.is_empty() {
                continue;
            }

            let mut parts = user_spec.splitn(3, ':');
            let user = parts.next().unwrap_or_default().trim();
            let Some(password) = parts.next() else {
                tracing::warn!(user, "user entry without password skipped");
                continue;
            };
            let role = parts
                .next()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string);

            if !user.is_empty() {
                auth.add_user(user, password, role);
            }
        }

        auth
    }

    /// Load the user table from an environment variable.
    pub fn from_env(env_var: &str) -> Self {
        std::env::var(env_var)
            .map(|spec| Self::parse_spec(&spec))
            .unwrap_or_default()
    }

    pub fn from_default_env() -> Self {
        Self::from_env(USERS_ENV)
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    /// Check a password synchronously.
    pub fn verify(&self, user: &str, password: &str) -> Option<UserData> {
        let users = self.users.read();
        let entry = users.get(user)?;
        // blake3::Hash equality is constant time
        if entry.digest != blake3::hash(password.as_bytes()) {
            return None;
        }
        Some(UserData {
            user: user.to_string(),
            role: entry.role.clone(),
            attributes: Default::default(),
        })
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn check_auth(&self, user: &str, password: &str) -> Option<UserData> {
        self.verify(user, password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec() {
        let auth = StaticAuthenticator::parse_spec("ann:secret:editor; bob:hunter2 ;broken");
        assert_eq!(auth.user_count(), 2);

        let ann = auth.verify("ann", "secret").unwrap();
        assert_eq!(ann.role.as_deref(), Some("editor"));

        let bob = auth.verify("bob", "hunter2").unwrap();
        assert_eq!(bob.role, None);
    }

    #[tokio::test]
    async fn test_check_auth() {
        let auth = StaticAuthenticator::new();
        auth.add_user("ann", "secret", None);

        assert!(auth.check_auth("ann", "secret").await.is_some());
        assert!(auth.check_auth("ann", "wrong").await.is_none());
        assert!(auth.check_auth("nobody", "secret").await.is_none());

        assert!(auth.remove_user("ann"));
        assert!(auth.check_auth("ann", "secret").await.is_none());
    }
}
