//! Server configuration.

use std::time::Duration;

use clap::Parser;
use tether_core::{OrchestratorConfig, SessionConfig};

use crate::error::Error;

/// Default address to listen on.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default prefix of every route.
pub const DEFAULT_URL_PREFIX: &str = "/sync";

/// Default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "tether";

/// Default idle time before a session expires, in minutes.
pub const DEFAULT_SESSION_TIMEOUT_MINS: u64 = 15;

/// Default interval between idle-session sweeps, in seconds.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Tether sync server command line arguments.
#[derive(Debug, Parser)]
#[command(name = "tether-server")]
#[command(about = "Real-time data sync server")]
pub struct Args {
    /// Address to listen on for HTTP and WebSocket connections.
    #[arg(short, long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// Prefix of every route.
    #[arg(long, default_value = DEFAULT_URL_PREFIX)]
    pub url_prefix: String,

    /// Name of the session cookie set on login.
    #[arg(long, default_value = DEFAULT_COOKIE_NAME)]
    pub cookie_name: String,

    /// Idle time (minutes) before a session expires.
    #[arg(long, default_value_t = DEFAULT_SESSION_TIMEOUT_MINS)]
    pub session_timeout_mins: u64,

    /// Maximum queued notifications per session (0 = unbounded).
    #[arg(long, default_value_t = tether_core::config::DEFAULT_MAX_PENDING)]
    pub max_pending: usize,

    /// Interval (seconds) between idle-session sweeps.
    #[arg(long, default_value_t = DEFAULT_CLEANUP_INTERVAL_SECS)]
    pub cleanup_interval_secs: u64,

    /// Deadline (seconds) for the policy check and for the storage call.
    #[arg(long, default_value_t = tether_core::config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Maximum number of compiled conditions strings kept in memory.
    #[arg(long, default_value_t = tether_core::conditions::DEFAULT_CACHE_CAPACITY)]
    pub conditions_cache: usize,

    /// Serve REST routes only, without the WebSocket endpoint.
    #[arg(long)]
    pub rest_only: bool,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen_addr: String,
    /// Prefix of every route, without a trailing slash.
    pub url_prefix: String,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Idle time before a session expires.
    pub session_timeout: Duration,
    /// Maximum queued notifications per session.
    pub max_pending: usize,
    /// Interval between idle-session sweeps.
    pub cleanup_interval: Duration,
    /// Deadline for the policy check and for the storage call.
    pub request_timeout: Duration,
    /// Capacity of the conditions compile cache.
    pub conditions_cache: usize,
    /// Whether the WebSocket endpoint is disabled.
    pub rest_only: bool,
}

impl ServerConfig {
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    pub fn with_url_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.url_prefix = normalize_prefix(prefix.as_ref());
        self
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_conditions_cache(mut self, entries: usize) -> Self {
        self.conditions_cache = entries;
        self
    }

    pub fn with_rest_only(mut self, rest_only: bool) -> Self {
        self.rest_only = rest_only;
        self
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.session_timeout.is_zero() {
            return Err(Error::Config("session timeout must be positive".into()));
        }
        if self.cleanup_interval.is_zero() {
            return Err(Error::Config("cleanup interval must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be positive".into()));
        }
        if self.conditions_cache == 0 {
            return Err(Error::Config("conditions cache must hold at least one entry".into()));
        }
        Ok(())
    }

    /// Registry settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_timeout(self.session_timeout)
            .with_max_pending(self.max_pending)
    }

    /// Orchestrator settings derived from this configuration.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default().with_request_timeout(self.request_timeout)
    }
}

impl From<&Args> for ServerConfig {
    fn from(args: &Args) -> Self {
        Self {
            listen_addr: args.listen.clone(),
            url_prefix: normalize_prefix(&args.url_prefix),
            cookie_name: args.cookie_name.clone(),
            session_timeout: Duration::from_secs(args.session_timeout_mins * 60),
            max_pending: args.max_pending,
            cleanup_interval: Duration::from_secs(args.cleanup_interval_secs),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            conditions_cache: args.conditions_cache,
            rest_only: args.rest_only,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_MINS * 60),
            max_pending: tether_core::config::DEFAULT_MAX_PENDING,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            request_timeout: Duration::from_secs(tether_core::config::DEFAULT_REQUEST_TIMEOUT_SECS),
            conditions_cache: tether_core::conditions::DEFAULT_CACHE_CAPACITY,
            rest_only: false,
        }
    }
}

/// Leading slash, no trailing slash. The root prefix becomes empty.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
