//! Periodic pickup of import jobs left `running` by a crashed or stopped
//! instance.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::runner::{ImportJobRunner, RunOutcome};

pub struct ImportResumptionCoordinator {
    runner: ImportJobRunner,
    interval: Duration,
}

impl ImportResumptionCoordinator {
    pub fn new(runner: ImportJobRunner, interval: Duration) -> Self {
        Self { runner, interval }
    }

    /// Run the coordinator loop until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            instance_id = self.runner.locks().instance_id(),
            "Import resumption coordinator started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Import resumption coordinator stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(resumed) if !resumed.is_empty() => {
                            tracing::info!(resumed = resumed.len(), "Resumed orphaned import jobs");
                        }
                        Ok(_) => tracing::debug!("No orphaned import jobs"),
                        Err(e) => tracing::error!(error = %e, "Import resumption cycle failed"),
                    }
                }
            }
        }
    }

    /// One pass: every `running` import job whose lease is free is resumed
    /// on its own task. Returns the handles of the resumed runs.
    pub async fn run_cycle(&self) -> Result<Vec<JoinHandle<RunOutcome>>, StoreError> {
        let candidates = self.runner.services().jobs.list_running_imports().await?;
        let mut handles = Vec::new();

        for job in candidates {
            if self.runner.registry().is_running(&job.id) {
                continue;
            }
            let job_id = job.id.clone();
            match self.runner.try_start(job).await {
                Ok(Some(handle)) => {
                    tracing::info!(job_id = %job_id, "Resuming import job");
                    handles.push(handle);
                }
                Ok(None) => {
                    tracing::debug!(job_id = %job_id, "Import job owned by a live instance");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Could not claim import job");
                }
            }
        }
        Ok(handles)
    }
}
