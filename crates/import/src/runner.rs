//! Locked execution of a single import job.
//!
//! The runner is handed a job whose lease this instance already holds. It
//! opens the job's blobs, keeps the lease alive, watches for cancel
//! requests, drives the orchestrator and finally gives the lease back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use twingraph_core::import_job::{ImportJobRecord, JobError};
use twingraph_core::status::ImportJobStatus;

use crate::config::ImportConfig;
use crate::error::StoreError;
use crate::lock::{HeartbeatEvent, JobLockManager};
use crate::orchestrator::{ImportJobOrchestrator, ImportOutcome};
use crate::ImportServices;

/// Jobs executing in this process, keyed by job id.
///
/// A cancel request arriving at this instance fires the job's token
/// directly; other instances only see the stored `cancel_requested` flag.
#[derive(Debug, Clone, Default)]
pub struct ImportJobRegistry {
    running: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ImportJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a job and return its cancellation token.
    pub fn register(&self, job_id: &str) -> CancellationToken {
        self.guard()
            .entry(job_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    pub fn remove(&self, job_id: &str) {
        self.guard().remove(job_id);
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.guard().contains_key(job_id)
    }

    /// Fire the token of a locally running job. `false` if not running here.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.guard().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a locked execution ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The job reached a terminal status.
    Finished(ImportOutcome),
    /// Another instance took the lease; nothing was finalized.
    LeaseLost,
    /// Infrastructure failure; the job stays `running` for a later retry.
    Aborted(StoreError),
}

#[derive(Clone)]
pub struct ImportJobRunner {
    services: ImportServices,
    locks: JobLockManager,
    registry: ImportJobRegistry,
    cancel_poll_interval: Duration,
}

impl ImportJobRunner {
    pub fn new(services: ImportServices, config: &ImportConfig, registry: ImportJobRegistry) -> Self {
        let locks = JobLockManager::new(services.locks.clone(), config.instance_id.as_str())
            .with_timing(config.lock_lease, config.heartbeat_interval);
        Self {
            services,
            locks,
            registry,
            cancel_poll_interval: config.cancel_poll_interval,
        }
    }

    pub fn services(&self) -> &ImportServices {
        &self.services
    }

    pub fn locks(&self) -> &JobLockManager {
        &self.locks
    }

    pub fn registry(&self) -> &ImportJobRegistry {
        &self.registry
    }

    /// Acquire the job's lease and run it on its own task.
    ///
    /// `job` may be stale: the record is re-read once the lease is held.
    /// `None` if another instance holds the lease, or if the job has
    /// finished or been deleted since `job` was read.
    pub async fn try_start(
        &self,
        job: ImportJobRecord,
    ) -> Result<Option<JoinHandle<RunOutcome>>, StoreError> {
        if !self.locks.try_acquire(&job.id).await? {
            tracing::debug!(job_id = %job.id, "Import job lease held elsewhere");
            return Ok(None);
        }

        let current = match self.services.jobs.get(&job.id).await {
            Ok(current) => current,
            Err(e) => {
                self.release_quietly(&job.id).await;
                return Err(e);
            }
        };
        let job = match current {
            Some(current) if current.status == ImportJobStatus::Running => current,
            other => {
                tracing::debug!(
                    job_id = %job.id,
                    status = other.as_ref().map(|j| j.status.as_str()),
                    "Import job no longer running, not starting it",
                );
                self.release_quietly(&job.id).await;
                return Ok(None);
            }
        };

        let runner = self.clone();
        Ok(Some(tokio::spawn(async move { runner.run_locked(job).await })))
    }

    async fn release_quietly(&self, job_id: &str) {
        if let Err(e) = self.locks.release(job_id).await {
            tracing::warn!(job_id, error = %e, "Failed to release job lease");
        }
    }

    /// Execute a job whose lease this instance holds.
    pub async fn run_locked(&self, job: ImportJobRecord) -> RunOutcome {
        let token = self.registry.register(&job.id);
        let outcome = self.execute(&job, &token).await;
        self.registry.remove(&job.id);

        match &outcome {
            RunOutcome::LeaseLost => {}
            RunOutcome::Finished(_) | RunOutcome::Aborted(_) => {
                self.release_quietly(&job.id).await;
            }
        }
        if let RunOutcome::Aborted(e) = &outcome {
            tracing::error!(job_id = %job.id, error = %e, "Import job run aborted");
        }
        outcome
    }

    async fn execute(&self, job: &ImportJobRecord, token: &CancellationToken) -> RunOutcome {
        let input = match self.services.blobs.open_read(&job.input_blob_uri).await {
            Ok(input) => input,
            Err(StoreError::NotFound { entity, id }) => {
                return self.fail_unreadable(job, entity, &id).await;
            }
            Err(e) => return RunOutcome::Aborted(e),
        };
        let output = match self.services.blobs.open_append(&job.output_blob_uri).await {
            Ok(output) => output,
            Err(e) => return RunOutcome::Aborted(e),
        };

        let orchestrator = ImportJobOrchestrator::new(
            self.services.jobs.clone(),
            self.services.checkpoints.clone(),
            self.services.graph.clone(),
        );
        let mut heartbeat = self.locks.spawn_heartbeat(&job.id);
        let mut cancel_poll = tokio::time::interval(self.cancel_poll_interval);

        let run = orchestrator.run(job, input, output, token);
        tokio::pin!(run);

        let outcome = loop {
            tokio::select! {
                result = &mut run => {
                    break match result {
                        Ok(outcome) => RunOutcome::Finished(outcome),
                        Err(e) => RunOutcome::Aborted(e),
                    };
                }
                Some(event) = heartbeat.recv() => match event {
                    HeartbeatEvent::LeaseLost => {
                        tracing::warn!(job_id = %job.id, "Lease lost, abandoning import run");
                        break RunOutcome::LeaseLost;
                    }
                    HeartbeatEvent::Failed { consecutive, error } => {
                        tracing::warn!(job_id = %job.id, consecutive, error = %error, "Heartbeat failing");
                    }
                },
                _ = cancel_poll.tick(), if !token.is_cancelled() => {
                    match self.services.jobs.is_cancel_requested(&job.id).await {
                        Ok(Some(true)) => {
                            tracing::info!(job_id = %job.id, "Cancel requested");
                            token.cancel();
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Cancel poll failed"),
                    }
                }
            }
        };

        heartbeat.stop().await;
        outcome
    }

    /// The input blob does not exist: no retry can succeed.
    async fn fail_unreadable(&self, job: &ImportJobRecord, entity: &str, id: &str) -> RunOutcome {
        let error = JobError::new("InputBlobNotFound", format!("{entity} {id} not found"));
        let counters = job.counters();
        match self
            .services
            .jobs
            .finish(&job.id, ImportJobStatus::Failed, &counters, Some(&error))
            .await
        {
            Ok(_) => {
                tracing::warn!(job_id = %job.id, blob = id, "Import input blob missing");
                RunOutcome::Finished(ImportOutcome {
                    status: ImportJobStatus::Failed,
                    counters,
                    error: Some(error),
                })
            }
            Err(e) => RunOutcome::Aborted(e),
        }
    }
}
