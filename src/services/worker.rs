use crate::services::storage_lifecycle::StorageLifecycleService;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodic age sweep that reclaims uploads abandoned by crashed requests.
pub struct BackgroundWorker {
    lifecycle: Arc<StorageLifecycleService>,
    max_age: chrono::Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        lifecycle: Arc<StorageLifecycleService>,
        max_age: chrono::Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            lifecycle,
            max_age,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Background worker started (sweep every {:?}, max age {} min)",
            self.interval,
            self.max_age.num_minutes()
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    async fn perform_cleanup(&self) {
        tracing::debug!("🧹 Running upload age sweep...");
        let removed = self.lifecycle.sweep_expired(self.max_age).await;
        if removed > 0 {
            tracing::warn!(
                "Age sweep reclaimed {} upload(s) that missed request cleanup",
                removed
            );
        }
    }
}
