//! Per-run import job state and terminal status determination.
//!
//! [`JobState`] is owned by exactly one orchestrator run. Counters only move
//! through its narrow mutation API, and the terminal status is a pure
//! function of the counters and whether cancellation was observed.

use serde::{Deserialize, Serialize};

use crate::checkpoint::ImportJobCheckpoint;
use crate::section::Section;
use crate::status::ImportJobStatus;

/// Aggregate counts stored on the job record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCounters {
    pub models_created: u64,
    pub twins_created: u64,
    pub relationships_created: u64,
    pub error_count: u64,
}

impl ImportCounters {
    pub fn total_created(&self) -> u64 {
        self.models_created + self.twins_created + self.relationships_created
    }
}

/// Mutable state of one orchestrator run.
#[derive(Debug, Clone)]
pub struct JobState {
    counters: ImportCounters,
    current_section: Section,
    completed: ImportJobCheckpoint,
    items_since_checkpoint: u64,
}

impl JobState {
    /// State for a run starting at the top of the input.
    pub fn fresh(job_id: &str) -> Self {
        Self {
            counters: ImportCounters::default(),
            current_section: Section::None,
            completed: ImportJobCheckpoint::new(job_id),
            items_since_checkpoint: 0,
        }
    }

    /// State restored from a persisted checkpoint.
    pub fn from_checkpoint(checkpoint: &ImportJobCheckpoint) -> Self {
        let mut completed = checkpoint.clone();
        completed.pending_models.clear();
        Self {
            counters: checkpoint.counters(),
            current_section: checkpoint.current_section,
            completed,
            items_since_checkpoint: 0,
        }
    }

    pub fn counters(&self) -> ImportCounters {
        self.counters
    }

    pub fn current_section(&self) -> Section {
        self.current_section
    }

    pub fn enter_section(&mut self, section: Section) {
        self.current_section = section;
    }

    pub fn mark_completed(&mut self, section: Section) {
        self.completed.mark_completed(section);
    }

    /// Whether data lines of `section` were already applied by an earlier run.
    pub fn is_completed(&self, section: Section) -> bool {
        self.completed.is_completed(section)
    }

    pub fn record_models_created(&mut self, count: u64) {
        self.counters.models_created += count;
        self.items_since_checkpoint += count;
    }

    pub fn record_twin_created(&mut self) {
        self.counters.twins_created += 1;
        self.items_since_checkpoint += 1;
    }

    pub fn record_relationship_created(&mut self) {
        self.counters.relationships_created += 1;
        self.items_since_checkpoint += 1;
    }

    pub fn record_error(&mut self) {
        self.counters.error_count += 1;
        self.items_since_checkpoint += 1;
    }

    /// Count a model line accumulated (not yet applied) towards the
    /// checkpoint cadence.
    pub fn record_model_buffered(&mut self) {
        self.items_since_checkpoint += 1;
    }

    /// Whether enough items were handled since the last save.
    pub fn checkpoint_due(&self, interval: u64) -> bool {
        self.items_since_checkpoint >= interval
    }

    /// Build a checkpoint snapshot and reset the cadence counter.
    pub fn snapshot(&mut self, line_number: u64, pending_models: &[String]) -> ImportJobCheckpoint {
        self.items_since_checkpoint = 0;
        let mut cp = self.completed.clone();
        cp.current_section = self.current_section;
        cp.line_number = line_number;
        cp.pending_models = pending_models.to_vec();
        cp.set_counters(&self.counters);
        cp
    }
}

/// Determine the terminal status of a run.
pub fn determine_status(counters: &ImportCounters, cancelled: bool) -> ImportJobStatus {
    if cancelled {
        ImportJobStatus::Cancelled
    } else if counters.error_count == 0 {
        ImportJobStatus::Succeeded
    } else if counters.total_created() > 0 {
        ImportJobStatus::PartiallySucceeded
    } else {
        ImportJobStatus::Failed
    }
}
