//! Per-job processing lease and its heartbeat task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use twingraph_core::job_lock::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_LEASE_DURATION};

use crate::error::StoreError;
use crate::store::JobLockStore;

/// Buffer for heartbeat events; the runner drains it continuously.
const EVENT_BUFFER: usize = 16;

/// Something the processing task needs to know about its lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// A renewal attempt failed. The lease may still be valid.
    Failed { consecutive: u32, error: String },
    /// The lease was released or taken over by another instance.
    LeaseLost,
}

/// Acquires, renews and releases job leases on behalf of one instance.
#[derive(Clone)]
pub struct JobLockManager {
    store: Arc<dyn JobLockStore>,
    instance_id: Arc<str>,
    lease: Duration,
    heartbeat_interval: Duration,
}

impl JobLockManager {
    pub fn new(store: Arc<dyn JobLockStore>, instance_id: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            instance_id: instance_id.into(),
            lease: DEFAULT_LEASE_DURATION,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_timing(mut self, lease: Duration, heartbeat_interval: Duration) -> Self {
        self.lease = lease;
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// `true` if this instance now holds the lease for `job_id`.
    pub async fn try_acquire(&self, job_id: &str) -> Result<bool, StoreError> {
        let acquired = self
            .store
            .try_acquire(job_id, &self.instance_id, self.lease)
            .await?;
        if let Some(lock) = &acquired {
            tracing::debug!(
                job_id,
                holder = %lock.lock_acquired_by,
                expires_at = %lock.lock_expires_at,
                "Job lease acquired",
            );
        }
        Ok(acquired.is_some())
    }

    /// Extend the lease. `false` if this instance no longer holds it.
    pub async fn renew_heartbeat(&self, job_id: &str) -> Result<bool, StoreError> {
        self.store.renew(job_id, &self.instance_id).await
    }

    pub async fn release(&self, job_id: &str) -> Result<bool, StoreError> {
        let released = self.store.release(job_id).await?;
        tracing::debug!(job_id, released, "Job lease released");
        Ok(released)
    }

    /// Start renewing the lease for `job_id` every heartbeat interval.
    pub fn spawn_heartbeat(&self, job_id: &str) -> HeartbeatHandle {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(heartbeat_loop(
            self.clone(),
            job_id.to_string(),
            tx,
            cancel.clone(),
        ));
        HeartbeatHandle {
            events: rx,
            cancel,
            task,
        }
    }
}

async fn heartbeat_loop(
    locks: JobLockManager,
    job_id: String,
    events: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(locks.heartbeat_interval);
    // The lease was just acquired; the first tick fires immediately.
    ticker.tick().await;
    let mut consecutive: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match locks.renew_heartbeat(&job_id).await {
                    Ok(true) => {
                        consecutive = 0;
                        tracing::trace!(job_id = %job_id, "Job lease renewed");
                    }
                    Ok(false) => {
                        tracing::warn!(job_id = %job_id, "Job lease lost");
                        let _ = events.send(HeartbeatEvent::LeaseLost).await;
                        break;
                    }
                    Err(e) => {
                        consecutive += 1;
                        tracing::warn!(
                            job_id = %job_id,
                            consecutive,
                            error = %e,
                            "Job lease renewal failed",
                        );
                        let _ = events.try_send(HeartbeatEvent::Failed {
                            consecutive,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Running heartbeat task for one job.
pub struct HeartbeatHandle {
    events: mpsc::Receiver<HeartbeatEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Next event, or `None` once the task has ended.
    pub async fn recv(&mut self) -> Option<HeartbeatEvent> {
        self.events.recv().await
    }

    /// Stop renewing and wait for the task to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Heartbeat task ended abnormally");
        }
    }
}
