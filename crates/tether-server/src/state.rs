use std::sync::Arc;
use std::time::Instant;

use tether_core::{
    Authenticator, ChangeDistributor, PolicyEngine, QueryPredicate, RequestOrchestrator,
    SessionRegistry, StorageBackend, TemporaryUrls,
};

use crate::config::ServerConfig;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub orchestrator: Arc<RequestOrchestrator>,
    pub authenticator: Arc<dyn Authenticator>,
    pub temp_urls: Arc<TemporaryUrls>,
    pub config: ServerConfig,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the registry, distributor and orchestrator around the given
    /// collaborators.
    pub fn new(
        config: ServerConfig,
        storage: Arc<dyn StorageBackend>,
        predicate: Arc<dyn QueryPredicate>,
        policy: Arc<dyn PolicyEngine>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.session_config()));
        Self::with_registry(config, registry, storage, predicate, policy, authenticator)
    }

    /// Like [`AppState::new`], around an existing registry.
    pub fn with_registry(
        config: ServerConfig,
        registry: Arc<SessionRegistry>,
        storage: Arc<dyn StorageBackend>,
        predicate: Arc<dyn QueryPredicate>,
        policy: Arc<dyn PolicyEngine>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let distributor = Arc::new(ChangeDistributor::new(registry.clone(), predicate));
        let orchestrator = RequestOrchestrator::new(registry.clone(), distributor, storage)
            .with_policy(policy)
            .with_config(config.orchestrator_config());

        Self {
            registry,
            orchestrator: Arc::new(orchestrator),
            authenticator,
            temp_urls: Arc::new(TemporaryUrls::new()),
            config,
            started_at: Instant::now(),
        }
    }

    /// Serve temporary URLs from `temp_urls`.
    pub fn with_temp_urls(mut self, temp_urls: Arc<TemporaryUrls>) -> Self {
        self.temp_urls = temp_urls;
        self
    }
}
