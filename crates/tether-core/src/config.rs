//! Core configuration.

use std::time::Duration;

/// Default idle timeout of a session (15 minutes).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 15 * 60;

/// Default cap on undelivered notifications per session.
pub const DEFAULT_MAX_PENDING: usize = 1000;

/// Default deadline for policy and storage calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Session registry configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which a session expires.
    pub timeout: Duration,

    /// Maximum queued notifications per session. `None` means unbounded.
    pub max_pending: Option<usize>,
}

impl SessionConfig {
    /// Set the session timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pending queue cap. Zero means unbounded.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = (max_pending > 0).then_some(max_pending);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            max_pending: Some(DEFAULT_MAX_PENDING),
        }
    }
}

/// Request orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for each policy check and storage call.
    pub request_timeout: Duration,
}

impl OrchestratorConfig {
    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(900));
        assert_eq!(config.max_pending, Some(1000));
    }

    #[test]
    fn test_zero_max_pending_is_unbounded() {
        let config = SessionConfig::default().with_max_pending(0);
        assert_eq!(config.max_pending, None);

        let config = config.with_max_pending(5);
        assert_eq!(config.max_pending, Some(5));
    }
}
