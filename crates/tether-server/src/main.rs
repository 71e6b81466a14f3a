//! Tether sync server binary.

use std::sync::Arc;

use clap::Parser;
use tether_core::{CapabilityPolicy, ConditionsEvaluator, MemoryStore, StaticAuthenticator};
use tether_server::{serve, AppState, Args, ServerConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_server=info,tether_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line args
    let args = Args::parse();
    let config = ServerConfig::from(&args);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen_addr,
        prefix = %config.url_prefix,
        rest_only = config.rest_only,
        "Starting Tether server"
    );

    let authenticator = StaticAuthenticator::from_default_env();
    let policy = CapabilityPolicy::from_default_env();
    if authenticator.user_count() == 0 {
        tracing::warn!("no users configured, every login will fail");
    }
    if policy.role_count() == 0 {
        tracing::warn!("no capabilities configured, every request will be denied");
    }

    let predicate = Arc::new(ConditionsEvaluator::with_capacity(config.conditions_cache));
    let storage = Arc::new(MemoryStore::with_predicate(predicate.clone()));
    let state = AppState::new(
        config.clone(),
        storage,
        predicate,
        Arc::new(policy),
        Arc::new(authenticator),
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);

    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await?;

    Ok(())
}
