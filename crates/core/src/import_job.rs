//! Import job constants, the document header, and id validation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job_state::ImportCounters;
use crate::options::ImportJobOptions;
use crate::status::ImportJobStatus;
use crate::types::{JobId, Timestamp};

/// `job_type` stored on every import job record.
pub const JOB_TYPE_IMPORT: &str = "import";

/// The only import document version understood by the engine.
pub const SUPPORTED_FILE_VERSION: &str = "1.0.0";

/// Maximum length of a caller-supplied job id.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Default number of hours a job record is kept after creation.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Line following the `Header` section marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHeader {
    pub file_version: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl FileHeader {
    pub fn is_supported(&self) -> bool {
        self.file_version == SUPPORTED_FILE_VERSION
    }
}

/// Terminal error recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// An import job as seen by the engine and the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobRecord {
    pub id: JobId,
    pub job_type: String,
    pub status: ImportJobStatus,
    pub input_blob_uri: String,
    pub output_blob_uri: String,
    pub options: ImportJobOptions,
    #[serde(rename = "createdDateTime")]
    pub created_at: Timestamp,
    #[serde(rename = "lastActionDateTime")]
    pub last_action_at: Timestamp,
    #[serde(rename = "finishedDateTime")]
    pub finished_at: Option<Timestamp>,
    #[serde(rename = "purgeDateTime")]
    pub purge_at: Timestamp,
    pub models_created: u64,
    pub twins_created: u64,
    pub relationships_created: u64,
    pub error_count: u64,
    pub error: Option<JobError>,
    #[serde(skip)]
    pub cancel_requested: bool,
}

impl ImportJobRecord {
    pub fn counters(&self) -> ImportCounters {
        ImportCounters {
            models_created: self.models_created,
            twins_created: self.twins_created,
            relationships_created: self.relationships_created,
            error_count: self.error_count,
        }
    }
}

/// Input for creating a new import job.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub id: JobId,
    pub input_blob_uri: String,
    pub output_blob_uri: String,
    pub options: ImportJobOptions,
    pub retention_hours: i64,
}

/// Validate a caller-supplied job id: 1..=128 characters of `[A-Za-z0-9_-]`.
pub fn validate_job_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() || id.len() > MAX_JOB_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Job id must be between 1 and {MAX_JOB_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(format!(
            "Job id '{id}' may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_version_check() {
        let header: FileHeader =
            serde_json::from_str(r#"{"fileVersion":"1.0.0","author":"ops"}"#).unwrap();
        assert!(header.is_supported());
        assert_eq!(header.author.as_deref(), Some("ops"));

        let old: FileHeader = serde_json::from_str(r#"{"fileVersion":"0.9.0"}"#).unwrap();
        assert!(!old.is_supported());
    }

    #[test]
    fn valid_job_ids() {
        assert!(validate_job_id("import-2026_10_18").is_ok());
        assert!(validate_job_id(&"a".repeat(MAX_JOB_ID_LEN)).is_ok());
    }

    #[test]
    fn invalid_job_ids() {
        assert!(validate_job_id("").is_err());
        assert!(validate_job_id(&"a".repeat(MAX_JOB_ID_LEN + 1)).is_err());
        assert!(validate_job_id("../etc").is_err());
        assert!(validate_job_id("has space").is_err());
    }
}
