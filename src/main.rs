//! Request guard demonstration server.
//!
//! ```text
//!     Client ──▶ listener ──▶ guard middleware ──▶ handlers
//!                                   │
//!                     ┌─────────────┼──────────────────┐
//!                     ▼             ▼                  ▼
//!                MemoryStore   ExitNodeCache      attack log
//!                     ▲             ▲
//!                  Sweeper    ExitNodeRefresher ──▶ exit list source
//!
//!     Operator ──▶ admin listener (bearer key) ──▶ same guard
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use request_guard::admin::{setup_admin_router, AdminState};
use request_guard::clock::{Clock, SystemClock};
use request_guard::config::watcher::ConfigWatcher;
use request_guard::config::{load_config, validate_config, AppConfig, ConfigError};
use request_guard::http::HttpServer;
use request_guard::lifecycle::{signalled, wait_for_signal, Shutdown};
use request_guard::observability::{logging, metrics};
use request_guard::security::{ExitNodeCache, ExitNodeRefresher, Guard, SharedGuard, Sweeper};
use request_guard::store::{MemoryStore, StateStore};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "request-guard")]
#[command(about = "HTTP server protected by the request admission guard", long_about = None)]
struct Args {
    /// TOML configuration file; watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let config = AppConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-guard starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &config.store.snapshot_path {
        if let Err(e) = store.load_snapshot(Path::new(path), clock.now_ms()) {
            tracing::warn!(error = %e, path = %path, "Ignoring unreadable blacklist snapshot");
        }
    }

    let exit_nodes = Arc::new(ExitNodeCache::new());
    let shared_store: Arc<dyn StateStore> = store.clone();
    let guard = Guard::with_parts(config.guard.clone(), shared_store, clock.clone(), exit_nodes.clone())?;
    let guard: SharedGuard = Arc::new(ArcSwap::from_pointee(guard));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        limit = config.guard.rate_limit.limit,
        interval_secs = config.guard.rate_limit.interval_secs,
        csrf = ?config.guard.csrf.strategy,
        anonymity = config.guard.anonymity.enabled,
        "Configuration loaded"
    );

    let mut shutdown = Shutdown::new();

    if config.guard.anonymity.enabled {
        let refresher = ExitNodeRefresher::new(&config.guard.anonymity, exit_nodes, clock.clone());
        let task = tokio::spawn(refresher.run(shutdown.subscribe()));
        shutdown.track(task);
    }

    let sweeper = Sweeper::new(guard.clone(), Duration::from_secs(config.store.sweep_interval_secs));
    let task = tokio::spawn(sweeper.run(shutdown.subscribe()));
    shutdown.track(task);

    // The watcher stops when dropped, so it lives until main returns.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let task = tokio::spawn(apply_config_updates(guard.clone(), updates, shutdown.subscribe()));
            shutdown.track(task);
            match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start config watcher, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState::new(guard.clone(), &config.admin.api_key));
        let stop = shutdown.subscribe();
        shutdown.track(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(signalled(stop))
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        }));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(&config.listener, guard.clone());
    let serve = server.run(listener, shutdown.subscribe());
    shutdown.track(tokio::spawn(async move {
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "HTTP server stopped with error");
        }
    }));

    wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.drain(SHUTDOWN_GRACE).await;

    if let Some(path) = &config.store.snapshot_path {
        if let Err(e) = store.save_snapshot(Path::new(path), clock.now_ms()) {
            tracing::error!(error = %e, path = %path, "Failed to save blacklist snapshot");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Swap in a guard built from each reloaded configuration. Listener and
/// admin settings only take effect on restart.
async fn apply_config_updates(
    guard: SharedGuard,
    mut updates: mpsc::UnboundedReceiver<AppConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match guard.load().reconfigure(config.guard) {
                    Ok(next) => {
                        guard.store(Arc::new(next));
                        tracing::info!("Guard configuration reloaded");
                    }
                    Err(e) => tracing::error!(error = %e, "Rejected reloaded guard configuration"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
