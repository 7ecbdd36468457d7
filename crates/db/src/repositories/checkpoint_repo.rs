//! Repository for the `import_job_checkpoints` table.
//!
//! One row per job, overwritten in place with `ON CONFLICT` so saving the
//! same snapshot twice is harmless.

use sqlx::PgPool;
use twingraph_core::checkpoint::ImportJobCheckpoint;

use crate::models::checkpoint::CheckpointRow;

/// Column list for `import_job_checkpoints` queries.
const COLUMNS: &str = "\
    job_id, current_section, line_number, models_completed, twins_completed, \
    relationships_completed, pending_models, models_processed, twins_processed, \
    relationships_processed, error_count, updated_at";

fn count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Provides load/save/delete for import job checkpoints.
pub struct CheckpointRepo;

impl CheckpointRepo {
    /// Upsert the checkpoint for its job.
    pub async fn save(pool: &PgPool, checkpoint: &ImportJobCheckpoint) -> Result<(), sqlx::Error> {
        let pending = serde_json::to_value(&checkpoint.pending_models)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            "INSERT INTO import_job_checkpoints \
                 (job_id, current_section, line_number, models_completed, twins_completed, \
                  relationships_completed, pending_models, models_processed, twins_processed, \
                  relationships_processed, error_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (job_id) DO UPDATE SET \
                 current_section         = EXCLUDED.current_section, \
                 line_number             = EXCLUDED.line_number, \
                 models_completed        = EXCLUDED.models_completed, \
                 twins_completed         = EXCLUDED.twins_completed, \
                 relationships_completed = EXCLUDED.relationships_completed, \
                 pending_models          = EXCLUDED.pending_models, \
                 models_processed        = EXCLUDED.models_processed, \
                 twins_processed         = EXCLUDED.twins_processed, \
                 relationships_processed = EXCLUDED.relationships_processed, \
                 error_count             = EXCLUDED.error_count, \
                 updated_at              = NOW()",
        )
        .bind(&checkpoint.job_id)
        .bind(checkpoint.current_section.as_str())
        .bind(count(checkpoint.line_number))
        .bind(checkpoint.models_completed)
        .bind(checkpoint.twins_completed)
        .bind(checkpoint.relationships_completed)
        .bind(&pending)
        .bind(count(checkpoint.models_processed))
        .bind(count(checkpoint.twins_processed))
        .bind(count(checkpoint.relationships_processed))
        .bind(count(checkpoint.error_count))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Load the checkpoint row for a job.
    pub async fn find_by_job(
        pool: &PgPool,
        job_id: &str,
    ) -> Result<Option<CheckpointRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_job_checkpoints WHERE job_id = $1");
        sqlx::query_as::<_, CheckpointRow>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete the checkpoint for a job. Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, job_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM import_job_checkpoints WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
