//! Detached fire-and-forget jobs (metrics, webhooks, shell hooks).
//!
//! Jobs are never awaited by the tick loop and carry no ordering guarantee
//! relative to later ticks. By default nothing bounds how many run at once;
//! with a limit, jobs beyond it are dropped with a warning.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    limit: Option<Arc<Semaphore>>,
}

impl BackgroundTasks {
    /// `max_in_flight == 0` means unbounded.
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            limit: (max_in_flight > 0).then(|| Arc::new(Semaphore::new(max_in_flight))),
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.limit.is_some()
    }

    /// Spawn `job` without waiting for it. Returns false if it was dropped.
    pub fn spawn<F>(&self, what: &str, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(limit) = &self.limit else {
            tokio::spawn(job);
            return true;
        };

        let permit = match limit.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!("Dropping {} job: background task limit reached", what);
                return false;
            }
        };

        tokio::spawn(async move {
            let _permit = permit; // Hold permit until done
            job.await;
        });
        true
    }
}
