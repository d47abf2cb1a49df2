//! Rota Booker - Entry Point
//!
//! Runs the proxy pool maintenance daemon with graceful shutdown support.

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rota_booker::config::{Config, LogConfig};
use rota_booker::services::{PoolMaintenanceHandle, PoolMaintenanceService};
use rota_booker::ProxyPool;

#[tokio::main]
async fn main() -> rota_booker::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config.log);
    info!("Starting Rota Booker pool daemon");

    let pool = Arc::new(ProxyPool::from_config(&config.pool)?);
    let stats = pool.stats();
    info!(
        "Pool ready with {} verified endpoints (cache: {})",
        stats.verified,
        config
            .pool
            .cache_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "disabled".to_string())
    );

    // Start pool maintenance
    let (maintenance_handle, maintenance_shutdown) = PoolMaintenanceHandle::new();
    let maintenance = PoolMaintenanceService::new(pool.clone(), config.pool.maintenance_interval);
    let maintenance_task = tokio::spawn(async move {
        maintenance.run(maintenance_shutdown).await;
    });

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    maintenance_handle.shutdown();
    if let Err(e) = maintenance_task.await {
        error!("Pool maintenance task failed: {}", e);
    }

    let stats = pool.stats();
    info!(
        verified = stats.verified,
        banned = stats.banned,
        "Rota Booker stopped"
    );
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("rota_booker={}", log.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if log.format.eq_ignore_ascii_case("pretty") {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
