//! Repository for the `import_jobs` table.
//!
//! Status literals always come from `ImportJobStatus`. Progress counters are
//! written as absolute values supplied by the engine, never incremented in
//! SQL, so a resumed run overwrites them deterministically.

use sqlx::PgPool;
use twingraph_core::import_job::{JobError, NewImportJob};
use twingraph_core::job_state::ImportCounters;
use twingraph_core::status::ImportJobStatus;
use twingraph_core::types::Timestamp;

use crate::models::import_job::{ImportJobListQuery, ImportJobRow};

/// Column list for `import_jobs` queries.
const COLUMNS: &str = "\
    id, job_type, status_id, input_blob_uri, output_blob_uri, options, \
    models_created, twins_created, relationships_created, error_count, \
    error, cancel_requested, created_at, last_action_at, finished_at, purge_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

fn count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Provides CRUD operations for import jobs.
pub struct ImportJobRepo;

impl ImportJobRepo {
    /// Insert a new job in `running` status.
    ///
    /// Returns `None` if a job with the same id already exists.
    pub async fn create(
        pool: &PgPool,
        job_type: &str,
        input: &NewImportJob,
    ) -> Result<Option<ImportJobRow>, sqlx::Error> {
        let options = serde_json::to_value(&input.options)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let query = format!(
            "INSERT INTO import_jobs \
                 (id, job_type, status_id, input_blob_uri, output_blob_uri, options, purge_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW() + make_interval(hours => $7)) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(&input.id)
            .bind(job_type)
            .bind(ImportJobStatus::Running.id())
            .bind(&input.input_blob_uri)
            .bind(&input.output_blob_uri)
            .bind(&options)
            .bind(input.retention_hours as i32)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by id.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<ImportJobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_jobs WHERE id = $1");
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs, newest first.
    pub async fn list(
        pool: &PgPool,
        params: &ImportJobListQuery,
    ) -> Result<Vec<ImportJobRow>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);
        let query = format!(
            "SELECT {COLUMNS} FROM import_jobs \
             ORDER BY created_at DESC, id ASC \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// List jobs of `job_type` still in `running` status, oldest first.
    pub async fn list_running(
        pool: &PgPool,
        job_type: &str,
    ) -> Result<Vec<ImportJobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_jobs \
             WHERE job_type = $1 AND status_id = $2 \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(job_type)
            .bind(ImportJobStatus::Running.id())
            .fetch_all(pool)
            .await
    }

    /// Stamp the start of a run. Terminal jobs are never reopened, so this
    /// returns `false` if the job is missing or no longer `running`.
    pub async fn mark_running(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET last_action_at = NOW(), finished_at = NULL, error = NULL \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(ImportJobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the progress counters of a `running` job.
    pub async fn update_progress(
        pool: &PgPool,
        id: &str,
        counters: &ImportCounters,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET models_created = $2, twins_created = $3, relationships_created = $4, \
                 error_count = $5, last_action_at = NOW() \
             WHERE id = $1 AND status_id = $6",
        )
        .bind(id)
        .bind(count(counters.models_created))
        .bind(count(counters.twins_created))
        .bind(count(counters.relationships_created))
        .bind(count(counters.error_count))
        .bind(ImportJobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the terminal status, final counters and optional error.
    ///
    /// Only a `running` job can finish; `false` means it was missing or
    /// already terminal and nothing changed.
    pub async fn finish(
        pool: &PgPool,
        id: &str,
        status: ImportJobStatus,
        counters: &ImportCounters,
        error: Option<&JobError>,
    ) -> Result<bool, sqlx::Error> {
        let error = error
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status_id = $2, models_created = $3, twins_created = $4, \
                 relationships_created = $5, error_count = $6, error = $7, \
                 last_action_at = NOW(), finished_at = NOW() \
             WHERE id = $1 AND status_id = $8",
        )
        .bind(id)
        .bind(status.id())
        .bind(count(counters.models_created))
        .bind(count(counters.twins_created))
        .bind(count(counters.relationships_created))
        .bind(count(counters.error_count))
        .bind(&error)
        .bind(ImportJobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flag a running job for cooperative cancellation.
    ///
    /// Returns `false` if the job does not exist or is already terminal.
    pub async fn request_cancel(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs SET cancel_requested = TRUE, last_action_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(ImportJobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether cancellation was requested. `None` if the job does not exist.
    pub async fn is_cancel_requested(pool: &PgPool, id: &str) -> Result<Option<bool>, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT cancel_requested FROM import_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a job. Its checkpoint cascades. Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM import_jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete terminal jobs whose purge time is before `cutoff`.
    pub async fn delete_purgeable(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM import_jobs WHERE purge_at < $1 AND status_id <> $2",
        )
        .bind(cutoff)
        .bind(ImportJobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
