//! Import job checkpoint snapshot.
//!
//! One checkpoint exists per job and is overwritten in place. It records
//! the input line reached, which sections are finished, the model lines
//! seen but not yet committed, and the progress counters, which is enough
//! for a fresh process to rebuild the engine state by re-reading the same
//! input from byte 0 and skipping `line_number` lines.

use serde::{Deserialize, Serialize};

use crate::job_state::ImportCounters;
use crate::section::Section;
use crate::types::JobId;

/// Number of processed items between two checkpoint saves inside a section.
pub const CHECKPOINT_ITEM_INTERVAL: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobCheckpoint {
    pub job_id: JobId,
    pub current_section: Section,
    /// Number of physical input lines fully consumed.
    pub line_number: u64,
    pub models_completed: bool,
    pub twins_completed: bool,
    pub relationships_completed: bool,
    /// Raw model lines of the current Models section, in input order.
    pub pending_models: Vec<String>,
    pub models_processed: u64,
    pub twins_processed: u64,
    pub relationships_processed: u64,
    pub error_count: u64,
}

impl ImportJobCheckpoint {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            current_section: Section::None,
            line_number: 0,
            models_completed: false,
            twins_completed: false,
            relationships_completed: false,
            pending_models: Vec::new(),
            models_processed: 0,
            twins_processed: 0,
            relationships_processed: 0,
            error_count: 0,
        }
    }

    /// Flag a data section as finished. Header/None are ignored.
    pub fn mark_completed(&mut self, section: Section) {
        match section {
            Section::Models => self.models_completed = true,
            Section::Twins => self.twins_completed = true,
            Section::Relationships => self.relationships_completed = true,
            Section::None | Section::Header => {}
        }
    }

    pub fn is_completed(&self, section: Section) -> bool {
        crate::section::should_skip_section(section, self)
    }

    /// Progress counters mirrored into the checkpoint.
    pub fn counters(&self) -> ImportCounters {
        ImportCounters {
            models_created: self.models_processed,
            twins_created: self.twins_processed,
            relationships_created: self.relationships_processed,
            error_count: self.error_count,
        }
    }

    pub fn set_counters(&mut self, counters: &ImportCounters) {
        self.models_processed = counters.models_created;
        self.twins_processed = counters.twins_created;
        self.relationships_processed = counters.relationships_created;
        self.error_count = counters.error_count;
    }
}
