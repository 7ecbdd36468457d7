//! Error types for the import engine.

use twingraph_core::error::CoreError;
use twingraph_core::import_job::JobError;
use twingraph_core::model_deps::ModelBatchError;

/// Failure of a job record, checkpoint, lock or blob store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt stored record: {0}")]
    Corrupt(#[from] CoreError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The job finished or was deleted while this instance held its lease.
    #[error("Import job {id} is no longer running")]
    NotRunning { id: String },
}

/// The input document itself is unusable. Never downgraded by
/// `continueOnFailure`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("empty input")]
    EmptyInput,

    #[error("first section must be Header")]
    MissingHeader,

    #[error("invalid header line: {0}")]
    InvalidHeader(String),

    #[error("unsupported file version '{found}'")]
    UnsupportedVersion { found: String },

    #[error("input ends at line {found}, before checkpointed line {expected}")]
    TruncatedInput { expected: u64, found: u64 },
}

impl StructuralError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "EmptyInput",
            Self::MissingHeader => "MissingHeader",
            Self::InvalidHeader(_) => "InvalidHeader",
            Self::UnsupportedVersion { .. } => "UnsupportedFileVersion",
            Self::TruncatedInput { .. } => "TruncatedInput",
        }
    }
}

/// Rejection of a single graph write.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error(transparent)]
    ModelBatch(#[from] ModelBatchError),

    #[error("Invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Rejected by graph store: {0}")]
    Rejected(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors that unwind an orchestrator run.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Invalid import input: {0}")]
    Structural(#[from] StructuralError),

    #[error("Line {line_number}: {message}")]
    ItemFailed { line_number: u64, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to read import input: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    /// Terminal error stored on the job record.
    pub fn to_job_error(&self) -> JobError {
        match self {
            Self::Structural(e) => JobError::new(e.code(), e.to_string()),
            Self::ItemFailed { .. } => JobError::new("ItemFailed", self.to_string()),
            Self::Store(e) => JobError::new("StoreFailure", e.to_string()),
            Self::Io(e) => JobError::new("InputReadFailure", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_errors_carry_codes() {
        let err = ImportError::from(StructuralError::UnsupportedVersion {
            found: "2.0.0".into(),
        });
        let job_error = err.to_job_error();
        assert_eq!(job_error.code, "UnsupportedFileVersion");
        assert!(job_error.message.contains("2.0.0"));
    }

    #[test]
    fn item_failure_message_names_line() {
        let err = ImportError::ItemFailed {
            line_number: 12,
            message: "missing $dtId".into(),
        };
        assert_eq!(err.to_job_error().message, "Line 12: missing $dtId");
    }
}
