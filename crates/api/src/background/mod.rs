//! Background tasks owned by the server process.
//!
//! The import resumption coordinator and the job retention loop are spawned
//! via `tokio::spawn` and share one [`CancellationToken`] for graceful
//! shutdown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use twingraph_import::config::ImportConfig;
use twingraph_import::coordinator::ImportResumptionCoordinator;
use twingraph_import::retention;
use twingraph_import::runner::ImportJobRunner;

pub struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Spawn the coordinator and the retention loop.
    pub fn spawn(runner: ImportJobRunner, config: &ImportConfig) -> Self {
        let cancel = CancellationToken::new();
        let jobs = runner.services().jobs.clone();

        let coordinator = ImportResumptionCoordinator::new(runner, config.resume_interval);
        let coordinator_cancel = cancel.clone();
        let coordinator_handle = tokio::spawn(async move {
            coordinator.run(coordinator_cancel).await;
        });

        let retention_handle = tokio::spawn(retention::run(jobs, cancel.clone()));

        tracing::info!("Background tasks started (import resumption, job retention)");
        Self {
            cancel,
            handles: vec![coordinator_handle, retention_handle],
        }
    }

    /// Signal every task to stop and wait up to `timeout` for each.
    pub async fn shutdown(self, timeout: Duration) {
        self.cancel.cancel();
        for handle in self.handles {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!("Background task did not stop in time");
            }
        }
        tracing::info!("Background tasks stopped");
    }
}
