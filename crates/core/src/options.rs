//! Per-job import options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const DEFAULT_MODELS_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Upper bound on twin/relationship batch size.
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportJobOptions {
    /// Kept for API compatibility. Models are always applied as one
    /// dependency-ordered batch per Models section.
    pub models_batch_size: usize,
    /// Twins and relationships are flushed every `batch_size` items.
    pub batch_size: usize,
    /// Keep going after a per-item failure.
    pub continue_on_failure: bool,
    /// Ceiling for a single graph store call.
    pub operation_timeout_secs: u64,
}

impl Default for ImportJobOptions {
    fn default() -> Self {
        Self {
            models_batch_size: DEFAULT_MODELS_BATCH_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            continue_on_failure: true,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }
}

impl ImportJobOptions {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(CoreError::Validation(format!(
                "batchSize must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }
        if self.models_batch_size == 0 {
            return Err(CoreError::Validation(
                "modelsBatchSize must be positive".into(),
            ));
        }
        if self.operation_timeout_secs == 0 {
            return Err(CoreError::Validation(
                "operationTimeoutSecs must be positive".into(),
            ));
        }
        Ok(())
    }
}
