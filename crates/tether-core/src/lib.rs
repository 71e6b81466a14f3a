//! Session tracking and change distribution for the Tether sync server.
//!
//! The engine keeps, per authenticated session, the queries and records the
//! session has seen. When a write commits, the [`ChangeDistributor`] checks
//! every other session's interests and pushes the change, or queues it while
//! the session is disconnected. The [`RequestOrchestrator`] ties this to a
//! pluggable [`StorageBackend`] and [`PolicyEngine`].

pub mod auth;
pub mod backend;
pub mod clock;
pub mod conditions;
pub mod config;
pub mod connection;
pub mod distributor;
pub mod error;
pub mod interest;
pub mod memstore;
pub mod mutation;
pub mod orchestrator;
pub mod policy;
pub mod session;
pub mod tempurl;

pub use auth::StaticAuthenticator;
pub use backend::{
    AcceptAll, Authenticator, BackendError, PolicyDecision, PolicyEngine, QueryPredicate,
    StorageBackend,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use conditions::ConditionsEvaluator;
pub use config::{OrchestratorConfig, SessionConfig};
pub use connection::ConnectionHandle;
pub use distributor::{ChangeDistributor, Disposition, DistributionReport};
pub use error::{Result, SyncError};
pub use interest::{InterestTracker, MatchVerdict};
pub use memstore::MemoryStore;
pub use mutation::StoreMutation;
pub use orchestrator::{Reply, RequestOrchestrator};
pub use policy::CapabilityPolicy;
pub use session::{PushOutcome, SessionId, SessionRegistry, UserData};
pub use tempurl::{TemporaryResource, TemporaryUrls, UrlLimit};
