//! Shutdown coordination.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Broadcast coordinator for graceful shutdown.
///
/// The HTTP listeners, the exit relay refresher and the state sweeper each
/// hold a receiver and stop when the signal fires.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx, tasks: Vec::new() }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Track a background task so [`Shutdown::drain`] waits for it.
    pub fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Fire the signal and wait up to `grace` for every tracked task.
    /// Tasks still running afterwards are aborted; returns how many were.
    pub async fn drain(self, grace: Duration) -> usize {
        self.trigger();
        let deadline = tokio::time::Instant::now() + grace;
        let mut aborted = 0;
        for mut task in self.tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                task.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            tracing::warn!(aborted, "Background tasks did not stop within the grace period");
        }
        aborted
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the shutdown signal fires or its sender is gone.
pub async fn signalled(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}
