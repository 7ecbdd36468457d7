//! Repository for the `import_job_locks` table.
//!
//! Acquisition is a single `INSERT ... ON CONFLICT DO UPDATE ... WHERE`
//! statement: the row is created, or taken over only when the current lease
//! has expired. Concurrent callers serialize on the row, so at most one of
//! them gets a row back.

use sqlx::PgPool;

use crate::models::job_lock::JobLockRow;

/// Column list for `import_job_locks` queries.
const COLUMNS: &str = "\
    job_id, acquired_at, acquired_by, lease_duration_secs, heartbeat_at, expires_at";

/// Provides lease operations for import jobs.
pub struct JobLockRepo;

impl JobLockRepo {
    /// Try to take the lease for `job_id` on behalf of `holder`.
    ///
    /// Returns the new lock row on success, `None` if another unexpired
    /// lease exists.
    pub async fn try_acquire(
        pool: &PgPool,
        job_id: &str,
        holder: &str,
        lease_secs: i64,
    ) -> Result<Option<JobLockRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_job_locks \
                 (job_id, acquired_at, acquired_by, lease_duration_secs, heartbeat_at, expires_at) \
             VALUES ($1, NOW(), $2, $3, NULL, \
                     NOW() + make_interval(secs => $3::BIGINT::DOUBLE PRECISION)) \
             ON CONFLICT (job_id) DO UPDATE SET \
                 acquired_at         = EXCLUDED.acquired_at, \
                 acquired_by         = EXCLUDED.acquired_by, \
                 lease_duration_secs = EXCLUDED.lease_duration_secs, \
                 heartbeat_at        = NULL, \
                 expires_at          = EXCLUDED.expires_at \
             WHERE import_job_locks.expires_at < NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobLockRow>(&query)
            .bind(job_id)
            .bind(holder)
            .bind(lease_secs)
            .fetch_optional(pool)
            .await
    }

    /// Extend the lease from now, if `holder` still owns it.
    ///
    /// Returns `false` when the lease was released or taken over.
    pub async fn renew(pool: &PgPool, job_id: &str, holder: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_job_locks \
             SET heartbeat_at = NOW(), \
                 expires_at = NOW() + make_interval(secs => lease_duration_secs::DOUBLE PRECISION) \
             WHERE job_id = $1 AND acquired_by = $2",
        )
        .bind(job_id)
        .bind(holder)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Current lock row, expired or not.
    pub async fn find(pool: &PgPool, job_id: &str) -> Result<Option<JobLockRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_job_locks WHERE job_id = $1");
        sqlx::query_as::<_, JobLockRow>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete the lock unconditionally.
    pub async fn release(pool: &PgPool, job_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM import_job_locks WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
