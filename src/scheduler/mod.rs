//! Scheduler module: one task per monitor, cancellation and shutdown.

use crate::monitor::Monitor;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Runs monitors and stops them again.
pub struct Scheduler {
    stop_tokens: Arc<RwLock<HashMap<usize, CancellationToken>>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    next_id: AtomicUsize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            stop_tokens: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Start the monitor's loop and return an id usable with [`Scheduler::stop`].
    pub async fn add_monitor(&self, monitor: Monitor) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stop = self.shutdown.child_token();
        self.stop_tokens.write().await.insert(id, stop.clone());

        tracing::info!("Scheduler: Adding monitor {}", monitor.name());

        let span = tracing::info_span!("monitor", name = %monitor.name());
        let stop_tokens = self.stop_tokens.clone();

        self.tracker.spawn(
            async move {
                monitor.run(stop).await;

                // Clean up when done
                stop_tokens.write().await.remove(&id);
            }
            .instrument(span),
        );

        id
    }

    /// Stop one monitor. Stopping twice, or after shutdown, is a no-op.
    pub async fn stop(&self, id: usize) {
        if let Some(stop) = self.stop_tokens.read().await.get(&id) {
            stop.cancel();
            tracing::info!("Scheduler: Stopping monitor {}", id);
        }
    }

    /// Number of monitor loops still registered.
    pub async fn running(&self) -> usize {
        self.stop_tokens.read().await.len()
    }

    /// Cancel every monitor and wait until all of them have exited.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Scheduler: All monitors stopped");
    }
}
