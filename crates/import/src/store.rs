//! Durable stores the engine depends on: job records, checkpoints and
//! processing leases.
//!
//! Each store only needs atomic single-key reads and writes. Postgres
//! implementations live in [`crate::pg`], in-memory ones in
//! [`crate::memory`].

use std::time::Duration;

use async_trait::async_trait;
use twingraph_core::checkpoint::ImportJobCheckpoint;
use twingraph_core::import_job::{ImportJobRecord, JobError, NewImportJob};
use twingraph_core::job_lock::JobLockInfo;
use twingraph_core::job_state::ImportCounters;
use twingraph_core::status::ImportJobStatus;
use twingraph_core::types::Timestamp;

use crate::error::StoreError;

#[async_trait]
pub trait ImportJobStore: Send + Sync {
    /// Insert a new running job. `None` if the id is taken.
    async fn create(&self, job: &NewImportJob) -> Result<Option<ImportJobRecord>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<ImportJobRecord>, StoreError>;

    /// Newest first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ImportJobRecord>, StoreError>;

    /// Import jobs still in `running` status, oldest first.
    async fn list_running_imports(&self) -> Result<Vec<ImportJobRecord>, StoreError>;

    async fn mark_running(&self, id: &str) -> Result<bool, StoreError>;

    async fn update_progress(&self, id: &str, counters: &ImportCounters)
        -> Result<bool, StoreError>;

    async fn finish(
        &self,
        id: &str,
        status: ImportJobStatus,
        counters: &ImportCounters,
        error: Option<&JobError>,
    ) -> Result<bool, StoreError>;

    /// `false` if the job is missing or already terminal.
    async fn request_cancel(&self, id: &str) -> Result<bool, StoreError>;

    /// `None` if the job is missing.
    async fn is_cancel_requested(&self, id: &str) -> Result<Option<bool>, StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete terminal jobs whose purge time is before `cutoff`.
    async fn delete_purgeable(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, job_id: &str) -> Result<Option<ImportJobCheckpoint>, StoreError>;

    /// Overwrite the job's checkpoint. Idempotent.
    async fn save(&self, checkpoint: &ImportJobCheckpoint) -> Result<(), StoreError>;

    async fn delete(&self, job_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait JobLockStore: Send + Sync {
    /// Create the lease, or take over an expired one. First writer wins.
    async fn try_acquire(
        &self,
        job_id: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<Option<JobLockInfo>, StoreError>;

    /// Extend the lease from now. `false` if `holder` no longer owns it.
    async fn renew(&self, job_id: &str, holder: &str) -> Result<bool, StoreError>;

    async fn get(&self, job_id: &str) -> Result<Option<JobLockInfo>, StoreError>;

    /// Delete the lease unconditionally.
    async fn release(&self, job_id: &str) -> Result<bool, StoreError>;
}
