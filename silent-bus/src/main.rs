use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use silent_bus::busnearby::{BusNearbyClient, BusNearbyConfig, RetryPolicy};
use silent_bus::cache::{CacheConfig, CachedBusNearbyClient};
use silent_bus::config::{CONFIG_PATH_ENV, ConfigStore, DEFAULT_CONFIG_PATH};
use silent_bus::registry::Registry;
use silent_bus::web::{AppState, create_router};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,silent_bus=debug,tower_http=info".into()),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Entries that could not reach BusNearby at startup are retried until they
/// come up or the server stops.
fn setup_retry_policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_secs(10), u32::MAX)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let store = Arc::new(ConfigStore::open(&path)?);
    let config = store.current();
    info!(path = %path, entries = config.entries.len(), "Loaded configuration");

    let client = BusNearbyClient::new(BusNearbyConfig::default())?;
    let stations = CachedBusNearbyClient::new(client.clone(), &CacheConfig::default());

    let registry = Arc::new(Registry::new(
        Arc::new(client),
        Arc::new(stations.clone()),
        Arc::clone(&store),
    ));

    for (id, e) in registry.setup_all().await {
        match store.entry(&id) {
            Some(entry) if e.is_transient() => {
                warn!(entry = %id, error = %e, "Entry not ready, retrying in the background");
                registry.spawn_setup_retry(entry, setup_retry_policy());
            }
            _ => warn!(entry = %id, error = %e, "Entry not started"),
        }
    }

    let app = create_router(AppState::new(Arc::clone(&registry), stations));

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!(addr = %config.bind, "Silent Bus listening");
    info!("API Endpoints:");
    info!("  GET  /health                    - Health check");
    info!("  GET  /api/entries               - Running entries");
    info!("  GET  /api/entries/:id/sensors   - Sensor readings");
    info!("  POST /api/entries/:id/refresh   - Refresh now");
    info!("  POST /api/entries/:id/reload    - Reload from config");
    info!("  PUT  /api/entries/:id/lines     - Update line filters");
    info!("  GET  /api/stations/search       - Station search");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("Shutting down");
    registry.shutdown().await;
    Ok(())
}
