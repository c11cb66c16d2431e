//! Beacon Registry HTTP Server

use axum::{Router, routing::{get, post}};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use beacon::{
    ClusterRegistrar, ClusterStore, DiscoveryService, MemoryClusterStore,
    MemoryRegistrationStore, RegistrationStore, ReplayCache, eviction_channel,
    run_eviction_worker,
};

use crate::config::Settings;
use crate::handlers::{self, AppState};
use crate::store::{RedisClusterStore, RedisRegistrationStore};

const KEY_PREFIX: &str = "beacon";

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/clusters", post(handlers::register_cluster))
        .route("/discover", post(handlers::discover))
        .with_state(state)
}

pub async fn run(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    if settings.rate_limiting_disabled {
        tracing::warn!("Rate limiting is disabled by configuration");
    }

    let (clusters, registrations): (Arc<dyn ClusterStore>, Arc<dyn RegistrationStore>) =
        match &settings.connection_string {
            Some(url) => {
                tracing::info!("Connecting to Redis at {}", url);
                let client = redis::Client::open(url.as_str())
                    .map_err(|e| format!("Failed to create Redis client: {}", e))?;
                let conn = ConnectionManager::new(client)
                    .await
                    .map_err(|e| format!("Failed to connect to Redis: {}", e))?;
                tracing::info!("Connected to Redis");
                (
                    Arc::new(RedisClusterStore::new(conn.clone(), KEY_PREFIX)),
                    Arc::new(RedisRegistrationStore::new(conn, KEY_PREFIX)),
                )
            }
            None => {
                tracing::warn!(
                    "ConnectionStrings__DefaultConnection not set, running on in-memory storage"
                );
                (
                    Arc::new(MemoryClusterStore::new()),
                    Arc::new(MemoryRegistrationStore::new()),
                )
            }
        };

    let replay = Arc::new(ReplayCache::new(settings.nonce_window));
    let (eviction, hint_rx) = eviction_channel();
    let eviction_worker = tokio::spawn(run_eviction_worker(
        hint_rx,
        registrations.clone(),
        settings.max_per_group,
    ));

    let state = Arc::new(AppState {
        discovery: DiscoveryService::new(
            clusters.clone(),
            registrations,
            replay,
            eviction,
            settings.max_per_group,
        ),
        registrar: ClusterRegistrar::new(clusters),
    });

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Beacon Registry service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last hint producer; once it is gone the worker
    // drains queued hints and exits.
    eviction_worker.await?;

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C signal"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received SIGTERM signal");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Starting graceful shutdown...");
}
