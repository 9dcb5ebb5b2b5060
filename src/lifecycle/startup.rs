//! Startup orchestration for the gateway daemon.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging, metrics and the gateway in dependency order
//! - Keep the endpoint set in step with the config file
//! - Run until a shutdown signal arrives

use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use crate::config::watcher::ConfigWatcher;
use crate::config::{load_config, ConfigError, GatewayConfig};
use crate::gateway::Gateway;
use crate::health::TokioScheduler;
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::lifecycle::signals::shutdown_signal;
use crate::observability::{logging, metrics};
use crate::resilience::CircuitState;

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid metrics address {address:?}: {source}")]
    MetricsAddress {
        address: String,
        source: AddrParseError,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("no Tokio runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// Run the gateway until SIGINT/SIGTERM.
///
/// Without a config path the built-in defaults are used and nothing is watched.
pub async fn run(config_path: Option<PathBuf>) -> Result<(), StartupError> {
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?config_path, "ai-gateway starting");

    if config.observability.metrics_enabled {
        let address = &config.observability.metrics_address;
        let addr: SocketAddr = address.parse().map_err(|source| StartupError::MetricsAddress {
            address: address.clone(),
            source,
        })?;
        metrics::init_metrics(addr)?;
    }

    let scheduler = Arc::new(TokioScheduler::current()?);
    let gateway = Arc::new(Gateway::new(config, scheduler));
    let shutdown = Shutdown::new();

    // The watcher stops delivering events once dropped, so keep it for the whole run.
    let _watcher = match &config_path {
        Some(path) => Some(spawn_reload(path, gateway.clone(), shutdown.subscribe())?),
        None => None,
    };
    let status = tokio::spawn(report_status(gateway.clone(), shutdown.subscribe()));

    let signal = shutdown_signal().await?;
    tracing::info!(%signal, "Shutdown signal received");
    shutdown.trigger();
    if let Err(e) = status.await {
        tracing::warn!(error = %e, "Status task ended abnormally");
    }

    match serde_json::to_string(&gateway.snapshot()) {
        Ok(snapshot) => tracing::info!(%snapshot, "Final gateway state"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize final gateway state"),
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn spawn_reload(
    path: &Path,
    gateway: Arc<Gateway>,
    shutdown: ShutdownSignal,
) -> Result<notify::RecommendedWatcher, StartupError> {
    let (watcher, updates) = ConfigWatcher::new(path);
    let watcher = watcher.run()?;
    tokio::spawn(apply_reloads(updates, gateway, shutdown));
    Ok(watcher)
}

async fn apply_reloads(
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    gateway: Arc<Gateway>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => gateway.apply_config(config),
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Config reload task stopped");
}

/// Log a compact health summary periodically.
async fn report_status(gateway: Arc<Gateway>, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = gateway.snapshot();
                let open_breakers = snapshot
                    .breakers
                    .iter()
                    .filter(|b| b.state == CircuitState::Open)
                    .count();
                tracing::info!(
                    endpoints = snapshot.endpoints.total_endpoints,
                    healthy = snapshot.endpoints.healthy_endpoints,
                    requests = snapshot.endpoints.total_requests,
                    open_breakers,
                    "Gateway status"
                );
            }
            _ = shutdown.recv() => break,
        }
    }
}
