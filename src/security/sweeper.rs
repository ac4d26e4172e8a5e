//! Periodic removal of expired guard state.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::security::guard::SharedGuard;

pub struct Sweeper {
    guard: SharedGuard,
    interval: Duration,
}

impl Sweeper {
    pub fn new(guard: SharedGuard, interval: Duration) -> Self {
        Self { guard, interval }
    }

    /// One pass over the current guard's store.
    pub fn sweep(&self) -> usize {
        let guard = self.guard.load();
        let forgotten = guard.purge_expired();
        let stats = guard.store().stats(guard.clock().now_ms());
        metrics::record_tracked_identities(stats.tracked_identities);
        if forgotten > 0 {
            tracing::debug!(forgotten, remaining = stats.tracked_identities, "Swept expired guard state");
        }
        forgotten
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "State sweeper starting");

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; nothing has expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("State sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
