//! Periodic purge of finished import jobs past their retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::store::ImportJobStore;

/// How often the purge runs.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Delete terminal jobs whose purge time has passed. Checkpoints go with them.
pub async fn purge_expired(jobs: &dyn ImportJobStore) -> Result<u64, StoreError> {
    jobs.delete_purgeable(Utc::now()).await
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(jobs: Arc<dyn ImportJobStore>, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = PURGE_INTERVAL.as_secs(),
        "Import job retention started"
    );

    let mut interval = tokio::time::interval(PURGE_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Import job retention stopping");
                break;
            }
            _ = interval.tick() => {
                match purge_expired(jobs.as_ref()).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Import job retention: purged expired jobs");
                    }
                    Ok(_) => tracing::debug!("Import job retention: nothing to purge"),
                    Err(e) => tracing::error!(error = %e, "Import job retention: purge failed"),
                }
            }
        }
    }
}
