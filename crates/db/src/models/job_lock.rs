//! Processing lease row model.

use sqlx::FromRow;
use twingraph_core::job_lock::JobLockInfo;
use twingraph_core::types::Timestamp;

/// A row from the `import_job_locks` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobLockRow {
    pub job_id: String,
    pub acquired_at: Timestamp,
    pub acquired_by: String,
    pub lease_duration_secs: i64,
    pub heartbeat_at: Option<Timestamp>,
    pub expires_at: Timestamp,
}

impl From<JobLockRow> for JobLockInfo {
    fn from(row: JobLockRow) -> Self {
        Self {
            job_id: row.job_id,
            lock_acquired_at: row.acquired_at,
            lock_acquired_by: row.acquired_by,
            lock_lease_duration_secs: row.lease_duration_secs,
            lock_heartbeat_at: row.heartbeat_at,
            lock_expires_at: row.expires_at,
        }
    }
}
