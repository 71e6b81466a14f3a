//! Tether sync server.
//!
//! Serves the sync core over REST and a WebSocket push channel. Every route
//! lives under a configurable prefix (`/sync` by default).

pub mod config;
pub mod error;
pub mod json;
pub mod routes;
pub mod session;
pub mod state;

pub use config::{Args, ServerConfig};
pub use error::{AppError, Error};
pub use state::AppState;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tether_core::{SessionRegistry, TemporaryUrls};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut api = Router::new()
        .merge(routes::status::routes())
        .merge(routes::auth::routes())
        .merge(routes::tmp::routes())
        .merge(routes::rest::routes());
    if !state.config.rest_only {
        api = api.merge(routes::ws::routes());
    }

    let router = match state.config.url_prefix.as_str() {
        "" => api,
        prefix => Router::new().nest(prefix, api),
    };

    router
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Evict idle sessions and expired temporary URLs every `interval`.
pub async fn cleanup_task(
    registry: Arc<SessionRegistry>,
    temp_urls: Arc<TemporaryUrls>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let cleaned = registry.prune_expired();
        if cleaned > 0 {
            tracing::info!("Cleaned up {} expired sessions", cleaned);
        }
        let purged = temp_urls.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "purged expired temporary urls");
        }
    }
}

/// Serve `state` on `listener` until `shutdown` resolves, then tear down
/// every session.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    state.config.validate()?;

    let registry = state.registry.clone();
    let cleanup = tokio::spawn(cleanup_task(
        registry.clone(),
        state.temp_urls.clone(),
        state.config.cleanup_interval,
    ));

    let app = create_router(state);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    cleanup.abort();
    registry.shutdown();
    tracing::info!("Server stopped");

    result.map_err(Error::from)
}
