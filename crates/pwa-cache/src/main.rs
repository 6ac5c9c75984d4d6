//! PWA Cache - Offline shell cache and live-update coordinator

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Notify, watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, ConfigManager, LoggingConfig};
use pwa_api::{AppState, create_router};
use pwa_core::{
    CoordinatorConfig, CoordinatorExit, Registration, ReloadSignal, UpdateCoordinator,
    UpdateStatus,
};
use pwa_proxy::{OriginClient, OriginClientConfig};
use pwa_storage::{CacheStorage, LocalStorage, MemoryStorage};

/// PWA Cache - offline shell cache with versioned live updates
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "PWA_CACHE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "PWA_CACHE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    config.validate()?;

    init_logging(&config.logging);

    info!("Starting PWA Cache v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = if config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install metrics recorder")?;
        Some(Arc::new(handle))
    } else {
        None
    };

    // Initialize storage backend
    let storage: Arc<dyn CacheStorage> = match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory cache storage");
            Arc::new(MemoryStorage::new())
        }
        _ => {
            tokio::fs::create_dir_all(&config.storage.local.path).await?;
            info!("Using local cache storage at {}", config.storage.local.path);
            Arc::new(LocalStorage::new(&config.storage.local.path).await?)
        }
    };

    // Initialize origin client
    let app_origin = config.app_origin()?;
    let client = Arc::new(OriginClient::new(OriginClientConfig {
        app_origin: app_origin.clone(),
        upstream_url: config.upstream_url()?,
        skip_tls_verify: config.upstream.skip_tls_verify,
        timeout: config.upstream.timeout(),
    })?);

    match client.ping().await {
        Ok(true) => info!("Upstream {} is reachable", config.upstream.url),
        Ok(false) => warn!("Upstream {} returned a server error", config.upstream.url),
        Err(e) => warn!("Upstream {} is not reachable: {}", config.upstream.url, e),
    }

    // Install the configured controller version
    let manager = ConfigManager::new(config.clone(), args.config.clone());
    let registration = Arc::new(Registration::new(
        app_origin.clone(),
        storage,
        client.clone(),
        Arc::new(manager),
    ));

    match registration.update().await {
        Ok(outcome) => info!(
            "Controller {} ready ({:?})",
            config.controller.cache_name(),
            outcome
        ),
        Err(e) => warn!(
            "Initial install failed, requests pass through until an update succeeds: {}",
            e
        ),
    }

    // Update coordinator
    let (status_tx, status_rx) = watch::channel(UpdateStatus::Checking);
    let visibility = Arc::new(Notify::new());
    let reload = Arc::new(ReloadSignal::new());
    tokio::spawn(run_coordinator(
        registration.clone(),
        reload.clone(),
        config.coordinator,
        Arc::new(status_tx),
        visibility.clone(),
    ));

    let state = AppState::new(
        registration,
        client,
        app_origin.clone(),
        status_rx,
        visibility,
        reload,
    );

    let app = create_router(state, metrics_handle).layer(TraceLayer::new_for_http());

    // Determine bind address
    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);
    info!("Serving {} from {}", app_origin, config.upstream.url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Run coordinator sessions back to back; each reload starts a fresh one
async fn run_coordinator(
    registration: Arc<Registration>,
    reload: Arc<ReloadSignal>,
    config: CoordinatorConfig,
    status: Arc<watch::Sender<UpdateStatus>>,
    visibility: Arc<Notify>,
) {
    loop {
        let exit = UpdateCoordinator::new(Some(registration.clone()), reload.clone(), config)
            .with_status(status.clone())
            .with_visibility(visibility.clone())
            .begin_watching()
            .await;

        match exit {
            CoordinatorExit::Reloaded => {
                info!("Reload generation {}, starting new session", reload.generation());
            }
            other => {
                info!("Update coordinator stopped: {:?}", other);
                break;
            }
        }
    }
}

/// Initialize logging
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
