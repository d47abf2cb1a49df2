//! Pool maintenance service
//!
//! Keeps the verified endpoint set topped up in the background, independently of any run
//! that is drawing endpoints from the same pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, instrument};

use crate::proxy::ProxyPool;

pub struct PoolMaintenanceService {
    pool: Arc<ProxyPool>,
    interval: Duration,
}

impl PoolMaintenanceService {
    pub fn new(pool: Arc<ProxyPool>, interval: Duration) -> Self {
        Self { pool, interval }
    }

    /// Run the maintenance loop until shutdown is signalled
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting pool maintenance service (interval: {}s, minimum: {})",
            self.interval.as_secs(),
            self.pool.config().min_verified
        );

        // Initial refill on startup.
        self.tick().await;

        let mut ticker = interval(self.interval);
        ticker.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Pool maintenance service shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let added = self.pool.ensure_minimum().await;
        let stats = self.pool.stats();
        info!(
            added = added,
            verified = stats.verified,
            banned = stats.banned,
            "Pool maintenance pass complete"
        );
    }
}

/// Handle for stopping the pool maintenance service
pub struct PoolMaintenanceHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl PoolMaintenanceHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for PoolMaintenanceHandle {
    fn default() -> Self {
        Self::new().0
    }
}
