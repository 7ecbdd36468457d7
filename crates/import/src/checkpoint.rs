//! Checkpoint persistence for a running job.

use std::sync::Arc;

use twingraph_core::checkpoint::CHECKPOINT_ITEM_INTERVAL;
use twingraph_core::job_state::JobState;

use crate::store::{CheckpointStore, ImportJobStore};

/// Saves checkpoint snapshots and mirrors the counters onto the job record.
///
/// Save failures are transient infrastructure errors: they are logged and
/// the run continues. If they persist, the job resumes from an older
/// checkpoint and replays more lines.
pub struct CheckpointWriter {
    job_id: String,
    checkpoints: Arc<dyn CheckpointStore>,
    jobs: Arc<dyn ImportJobStore>,
    interval: u64,
}

impl CheckpointWriter {
    pub fn new(
        job_id: &str,
        checkpoints: Arc<dyn CheckpointStore>,
        jobs: Arc<dyn ImportJobStore>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            checkpoints,
            jobs,
            interval: CHECKPOINT_ITEM_INTERVAL,
        }
    }

    /// Persist the current state as of `line_number` consumed lines.
    ///
    /// The caller guarantees no twin or relationship is buffered; buffered
    /// model lines travel inside the snapshot.
    pub async fn save(&self, state: &mut JobState, line_number: u64, pending_models: &[String]) {
        let snapshot = state.snapshot(line_number, pending_models);
        match self.checkpoints.save(&snapshot).await {
            Ok(()) => tracing::debug!(
                job_id = %self.job_id,
                section = snapshot.current_section.as_str(),
                line_number,
                "Checkpoint saved",
            ),
            Err(e) => tracing::warn!(
                job_id = %self.job_id,
                line_number,
                error = %e,
                "Checkpoint save failed",
            ),
        }
        if let Err(e) = self.jobs.update_progress(&self.job_id, &state.counters()).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "Progress update failed");
        }
    }

    /// Save only when enough items were processed since the last save.
    pub async fn maybe_save(&self, state: &mut JobState, line_number: u64, pending_models: &[String]) {
        if state.checkpoint_due(self.interval) {
            self.save(state, line_number, pending_models).await;
        }
    }

    /// Drop the checkpoint after a successful run.
    pub async fn clear(&self) {
        if let Err(e) = self.checkpoints.delete(&self.job_id).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "Checkpoint delete failed");
        }
    }
}
