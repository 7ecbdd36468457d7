//! Per-job processing lease.
//!
//! A lock row says "instance X is processing job J until `lock_expires_at`".
//! The holder pushes the expiry forward on every heartbeat; once the expiry
//! passes the row counts as absent and any instance may take the job over.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Default lease length: two and a half heartbeat periods, so two missed
/// heartbeats in a row let the lease lapse.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(150);

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLockInfo {
    pub job_id: JobId,
    pub lock_acquired_at: Timestamp,
    pub lock_acquired_by: String,
    pub lock_lease_duration_secs: i64,
    pub lock_heartbeat_at: Option<Timestamp>,
    pub lock_expires_at: Timestamp,
}

impl JobLockInfo {
    /// A freshly acquired lease starting at `now`.
    pub fn acquired(job_id: &str, holder: &str, lease: Duration, now: Timestamp) -> Self {
        let lease_secs = lease_secs(lease);
        Self {
            job_id: job_id.to_string(),
            lock_acquired_at: now,
            lock_acquired_by: holder.to_string(),
            lock_lease_duration_secs: lease_secs,
            lock_heartbeat_at: None,
            lock_expires_at: now + lease_to_chrono(lease),
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.lock_expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.lock_acquired_by == holder
    }

    /// Push the expiry forward from `now` by the lease duration.
    pub fn renew(&mut self, now: Timestamp) {
        self.lock_heartbeat_at = Some(now);
        self.lock_expires_at = now + chrono::Duration::seconds(self.lock_lease_duration_secs);
    }
}

/// Lease length in whole seconds, never less than one.
pub fn lease_secs(lease: Duration) -> i64 {
    (lease.as_secs() as i64).max(1)
}

fn lease_to_chrono(lease: Duration) -> chrono::Duration {
    chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::seconds(lease_secs(lease)))
}
