//! Checkpoint row model for import job resumption.

use sqlx::FromRow;
use twingraph_core::checkpoint::ImportJobCheckpoint;
use twingraph_core::error::CoreError;
use twingraph_core::section::Section;
use twingraph_core::types::Timestamp;

/// A row from the `import_job_checkpoints` table.
#[derive(Debug, Clone, FromRow)]
pub struct CheckpointRow {
    pub job_id: String,
    pub current_section: String,
    pub line_number: i64,
    pub models_completed: bool,
    pub twins_completed: bool,
    pub relationships_completed: bool,
    pub pending_models: serde_json::Value,
    pub models_processed: i64,
    pub twins_processed: i64,
    pub relationships_processed: i64,
    pub error_count: i64,
    pub updated_at: Timestamp,
}

impl TryFrom<CheckpointRow> for ImportJobCheckpoint {
    type Error = CoreError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        let current_section = match row.current_section.as_str() {
            "None" => Section::None,
            other => Section::from_marker_name(other).ok_or_else(|| {
                CoreError::Internal(format!(
                    "checkpoint for {} has unknown section '{other}'",
                    row.job_id
                ))
            })?,
        };
        let pending_models: Vec<String> = serde_json::from_value(row.pending_models)
            .map_err(|e| CoreError::Internal(format!("checkpoint for {}: {e}", row.job_id)))?;

        Ok(Self {
            job_id: row.job_id,
            current_section,
            line_number: row.line_number.max(0) as u64,
            models_completed: row.models_completed,
            twins_completed: row.twins_completed,
            relationships_completed: row.relationships_completed,
            pending_models,
            models_processed: row.models_processed.max(0) as u64,
            twins_processed: row.twins_processed.max(0) as u64,
            relationships_processed: row.relationships_processed.max(0) as u64,
            error_count: row.error_count.max(0) as u64,
        })
    }
}
