use std::path::PathBuf;
use std::time::Duration;

use twingraph_core::import_job::DEFAULT_RETENTION_HOURS;
use twingraph_core::job_lock::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_LEASE_DURATION};

/// Default period of the resumption coordinator.
pub const DEFAULT_RESUME_INTERVAL: Duration = Duration::from_secs(120);

/// Default period for polling a running job's cancel flag.
pub const DEFAULT_CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Import engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Identity written into lease rows. Unique per process.
    pub instance_id: String,
    pub lock_lease: Duration,
    pub heartbeat_interval: Duration,
    pub resume_interval: Duration,
    pub cancel_poll_interval: Duration,
    /// Hours a job record is kept after creation.
    pub job_retention_hours: i64,
    /// Root directory of the local blob store.
    pub blob_root: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            lock_lease: DEFAULT_LEASE_DURATION,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            resume_interval: DEFAULT_RESUME_INTERVAL,
            cancel_poll_interval: DEFAULT_CANCEL_POLL_INTERVAL,
            job_retention_hours: DEFAULT_RETENTION_HOURS,
            blob_root: PathBuf::from("data/blobs"),
        }
    }
}

impl ImportConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                  |
    /// |----------------------------------|--------------------------|
    /// | `INSTANCE_ID`                    | `<HOSTNAME>-<uuid v4>`   |
    /// | `IMPORT_LOCK_LEASE_SECS`         | `150`                    |
    /// | `IMPORT_HEARTBEAT_INTERVAL_SECS` | `60`                     |
    /// | `IMPORT_RESUME_INTERVAL_SECS`    | `120`                    |
    /// | `IMPORT_CANCEL_POLL_SECS`        | `5`                      |
    /// | `IMPORT_JOB_RETENTION_HOURS`     | `24`                     |
    /// | `BLOB_ROOT`                      | `data/blobs`             |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let instance_id = std::env::var("INSTANCE_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.instance_id);

        let lock_lease = env_secs("IMPORT_LOCK_LEASE_SECS", defaults.lock_lease);
        let heartbeat_interval =
            env_secs("IMPORT_HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval);
        assert!(
            heartbeat_interval < lock_lease,
            "IMPORT_HEARTBEAT_INTERVAL_SECS must be shorter than IMPORT_LOCK_LEASE_SECS"
        );

        let job_retention_hours: i64 = std::env::var("IMPORT_JOB_RETENTION_HOURS")
            .map(|v| {
                v.parse()
                    .expect("IMPORT_JOB_RETENTION_HOURS must be a valid i64")
            })
            .unwrap_or(defaults.job_retention_hours);

        let blob_root = std::env::var("BLOB_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.blob_root);

        Self {
            instance_id,
            lock_lease,
            heartbeat_interval,
            resume_interval: env_secs("IMPORT_RESUME_INTERVAL_SECS", defaults.resume_interval),
            cancel_poll_interval: env_secs("IMPORT_CANCEL_POLL_SECS", defaults.cancel_poll_interval),
            job_retention_hours,
            blob_root,
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env_secs_from(&|n: &str| std::env::var(n).ok(), name, default)
}

/// Positive whole seconds read through `lookup`, or `default` when unset.
pub fn env_secs_from<F>(lookup: &F, name: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(v) => {
            let secs: u64 = v
                .parse()
                .unwrap_or_else(|_| panic!("{name} must be a valid number of seconds"));
            assert!(secs > 0, "{name} must be positive");
            Duration::from_secs(secs)
        }
        None => default,
    }
}

fn default_instance_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "instance".into());
    format!("{host}-{}", uuid::Uuid::new_v4())
}
