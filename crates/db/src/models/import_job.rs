//! Import job row model and its conversion into the domain record.

use serde::Deserialize;
use sqlx::FromRow;
use twingraph_core::error::CoreError;
use twingraph_core::import_job::{ImportJobRecord, JobError};
use twingraph_core::options::ImportJobOptions;
use twingraph_core::status::{ImportJobStatus, StatusId};
use twingraph_core::types::Timestamp;

/// A row from the `import_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct ImportJobRow {
    pub id: String,
    pub job_type: String,
    pub status_id: StatusId,
    pub input_blob_uri: String,
    pub output_blob_uri: String,
    pub options: serde_json::Value,
    pub models_created: i64,
    pub twins_created: i64,
    pub relationships_created: i64,
    pub error_count: i64,
    pub error: Option<serde_json::Value>,
    pub cancel_requested: bool,
    pub created_at: Timestamp,
    pub last_action_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub purge_at: Timestamp,
}

impl TryFrom<ImportJobRow> for ImportJobRecord {
    type Error = CoreError;

    fn try_from(row: ImportJobRow) -> Result<Self, Self::Error> {
        let status = ImportJobStatus::from_id(row.status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "import job {} has unknown status_id {}",
                row.id, row.status_id
            ))
        })?;
        let options: ImportJobOptions = serde_json::from_value(row.options)
            .map_err(|e| CoreError::Internal(format!("import job {} options: {e}", row.id)))?;
        let error = row
            .error
            .map(serde_json::from_value::<JobError>)
            .transpose()
            .map_err(|e| CoreError::Internal(format!("import job {} error: {e}", row.id)))?;

        Ok(Self {
            id: row.id,
            job_type: row.job_type,
            status,
            input_blob_uri: row.input_blob_uri,
            output_blob_uri: row.output_blob_uri,
            options,
            created_at: row.created_at,
            last_action_at: row.last_action_at,
            finished_at: row.finished_at,
            purge_at: row.purge_at,
            models_created: row.models_created.max(0) as u64,
            twins_created: row.twins_created.max(0) as u64,
            relationships_created: row.relationships_created.max(0) as u64,
            error_count: row.error_count.max(0) as u64,
            error,
            cancel_requested: row.cancel_requested,
        })
    }
}

/// Query parameters for listing import jobs.
#[derive(Debug, Default, Deserialize)]
pub struct ImportJobListQuery {
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
