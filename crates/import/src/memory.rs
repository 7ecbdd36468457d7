//! In-memory collaborators for tests and single-process use.
//!
//! Each store keeps its state behind a `std::sync::Mutex`; no lock is held
//! across an await point.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWrite;
use twingraph_core::checkpoint::ImportJobCheckpoint;
use twingraph_core::import_job::{ImportJobRecord, JobError, NewImportJob, JOB_TYPE_IMPORT};
use twingraph_core::job_lock::JobLockInfo;
use twingraph_core::job_state::ImportCounters;
use twingraph_core::model_deps::{order_models, parse_model};
use twingraph_core::status::ImportJobStatus;
use twingraph_core::types::Timestamp;

use crate::blob::{BlobReader, BlobStore, BlobWriter};
use crate::error::{GraphError, StoreError};
use crate::graph::{relationship_target_id, twin_model_id, GraphClient};
use crate::store::{CheckpointStore, ImportJobStore, JobLockStore};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn injected(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {what} failure"))
}

// ---------------------------------------------------------------------------
// Job records
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryImportJobStore {
    jobs: Mutex<BTreeMap<String, ImportJobRecord>>,
}

impl MemoryImportJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a record directly, bypassing `create`.
    pub fn put(&self, record: ImportJobRecord) {
        guard(&self.jobs).insert(record.id.clone(), record);
    }

    /// Apply `f` to a job still in `running` status.
    fn update_running<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ImportJobRecord),
    {
        match guard(&self.jobs).get_mut(id) {
            Some(job) if job.status == ImportJobStatus::Running => {
                f(job);
                job.last_action_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

fn apply_counters(job: &mut ImportJobRecord, counters: &ImportCounters) {
    job.models_created = counters.models_created;
    job.twins_created = counters.twins_created;
    job.relationships_created = counters.relationships_created;
    job.error_count = counters.error_count;
}

#[async_trait]
impl ImportJobStore for MemoryImportJobStore {
    async fn create(&self, job: &NewImportJob) -> Result<Option<ImportJobRecord>, StoreError> {
        let mut jobs = guard(&self.jobs);
        if jobs.contains_key(&job.id) {
            return Ok(None);
        }
        let now = Utc::now();
        let record = ImportJobRecord {
            id: job.id.clone(),
            job_type: JOB_TYPE_IMPORT.to_string(),
            status: ImportJobStatus::Running,
            input_blob_uri: job.input_blob_uri.clone(),
            output_blob_uri: job.output_blob_uri.clone(),
            options: job.options.clone(),
            created_at: now,
            last_action_at: now,
            finished_at: None,
            purge_at: now + chrono::Duration::hours(job.retention_hours),
            models_created: 0,
            twins_created: 0,
            relationships_created: 0,
            error_count: 0,
            error: None,
            cancel_requested: false,
        };
        jobs.insert(record.id.clone(), record.clone());
        Ok(Some(record))
    }

    async fn get(&self, id: &str) -> Result<Option<ImportJobRecord>, StoreError> {
        Ok(guard(&self.jobs).get(id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ImportJobRecord>, StoreError> {
        let mut jobs: Vec<ImportJobRecord> = guard(&self.jobs).values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_running_imports(&self) -> Result<Vec<ImportJobRecord>, StoreError> {
        let mut jobs: Vec<ImportJobRecord> = guard(&self.jobs)
            .values()
            .filter(|j| j.job_type == JOB_TYPE_IMPORT && j.status == ImportJobStatus::Running)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn mark_running(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.update_running(id, |job| {
            job.finished_at = None;
            job.error = None;
        }))
    }

    async fn update_progress(
        &self,
        id: &str,
        counters: &ImportCounters,
    ) -> Result<bool, StoreError> {
        Ok(self.update_running(id, |job| apply_counters(job, counters)))
    }

    async fn finish(
        &self,
        id: &str,
        status: ImportJobStatus,
        counters: &ImportCounters,
        error: Option<&JobError>,
    ) -> Result<bool, StoreError> {
        Ok(self.update_running(id, |job| {
            job.status = status;
            apply_counters(job, counters);
            job.error = error.cloned();
            job.finished_at = Some(Utc::now());
        }))
    }

    async fn request_cancel(&self, id: &str) -> Result<bool, StoreError> {
        let mut jobs = guard(&self.jobs);
        match jobs.get_mut(id) {
            Some(job) if job.status == ImportJobStatus::Running => {
                job.cancel_requested = true;
                job.last_action_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_cancel_requested(&self, id: &str) -> Result<Option<bool>, StoreError> {
        Ok(guard(&self.jobs).get(id).map(|j| j.cancel_requested))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(guard(&self.jobs).remove(id).is_some())
    }

    async fn delete_purgeable(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut jobs = guard(&self.jobs);
        let before = jobs.len();
        jobs.retain(|_, j| !(j.purge_at < cutoff && j.status.is_terminal()));
        Ok((before - jobs.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, ImportJobCheckpoint>>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail until switched off.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn put(&self, checkpoint: ImportJobCheckpoint) {
        guard(&self.checkpoints).insert(checkpoint.job_id.clone(), checkpoint);
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, job_id: &str) -> Result<Option<ImportJobCheckpoint>, StoreError> {
        Ok(guard(&self.checkpoints).get(job_id).cloned())
    }

    async fn save(&self, checkpoint: &ImportJobCheckpoint) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(injected("checkpoint save"));
        }
        self.put(checkpoint.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(guard(&self.checkpoints).remove(job_id).is_some())
    }
}

// ---------------------------------------------------------------------------
// Leases
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryLockStore {
    locks: Mutex<HashMap<String, JobLockInfo>>,
    fail_renewals: AtomicBool,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `renew` fail until switched off.
    pub fn set_fail_renewals(&self, fail: bool) {
        self.fail_renewals.store(fail, Ordering::SeqCst);
    }

    /// Backdate a lease so it reads as expired.
    pub fn expire(&self, job_id: &str) {
        if let Some(lock) = guard(&self.locks).get_mut(job_id) {
            lock.lock_expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    /// Install a lease held by `holder`, as if another instance owned it.
    pub fn hold(&self, job_id: &str, holder: &str, lease: Duration) {
        let lock = JobLockInfo::acquired(job_id, holder, lease, Utc::now());
        guard(&self.locks).insert(job_id.to_string(), lock);
    }
}

#[async_trait]
impl JobLockStore for MemoryLockStore {
    async fn try_acquire(
        &self,
        job_id: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<Option<JobLockInfo>, StoreError> {
        let now = Utc::now();
        let mut locks = guard(&self.locks);
        if let Some(existing) = locks.get(job_id) {
            if !existing.is_expired_at(now) {
                return Ok(None);
            }
        }
        let lock = JobLockInfo::acquired(job_id, holder, lease, now);
        locks.insert(job_id.to_string(), lock.clone());
        Ok(Some(lock))
    }

    async fn renew(&self, job_id: &str, holder: &str) -> Result<bool, StoreError> {
        if self.fail_renewals.load(Ordering::SeqCst) {
            return Err(injected("lease renewal"));
        }
        let mut locks = guard(&self.locks);
        match locks.get_mut(job_id) {
            Some(lock) if lock.is_held_by(holder) => {
                lock.renew(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobLockInfo>, StoreError> {
        Ok(guard(&self.locks).get(job_id).cloned())
    }

    async fn release(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(guard(&self.locks).remove(job_id).is_some())
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct GraphData {
    models: HashMap<String, serde_json::Value>,
    twins: HashMap<String, serde_json::Value>,
    relationships: HashMap<(String, String), serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct MemoryGraphClient {
    data: Mutex<GraphData>,
    rejected_ids: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryGraphClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any twin or relationship with this id.
    pub fn reject(&self, id: &str) {
        guard(&self.rejected_ids).insert(id.to_string());
    }

    /// Delay every call by `delay` before applying it.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *guard(&self.delay) = delay;
    }

    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = guard(&self.data).models.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn twin(&self, id: &str) -> Option<serde_json::Value> {
        guard(&self.data).twins.get(id).cloned()
    }

    pub fn twin_count(&self) -> usize {
        guard(&self.data).twins.len()
    }

    pub fn relationship_count(&self) -> usize {
        guard(&self.data).relationships.len()
    }

    async fn pause(&self) {
        let delay = *guard(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_rejected(&self, id: &str) -> Result<(), GraphError> {
        if guard(&self.rejected_ids).contains(id) {
            return Err(GraphError::Rejected(format!("{id} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphClient for MemoryGraphClient {
    async fn create_models_batch(&self, models: &[String]) -> Result<u64, GraphError> {
        self.pause().await;
        let descriptors = models
            .iter()
            .enumerate()
            .map(|(i, raw)| parse_model(i, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = guard(&self.data);
        let ordered = order_models(descriptors, |id| data.models.contains_key(id))?;
        let count = ordered.len() as u64;
        for model in ordered {
            data.models.insert(model.id, model.body);
        }
        Ok(count)
    }

    async fn create_or_replace_twin(
        &self,
        twin_id: &str,
        twin: &serde_json::Value,
    ) -> Result<(), GraphError> {
        self.pause().await;
        self.check_rejected(twin_id)?;
        if !twin.is_object() {
            return Err(GraphError::Invalid {
                kind: "twin",
                reason: "not a JSON object".into(),
            });
        }

        let mut data = guard(&self.data);
        if let Some(model_id) = twin_model_id(twin) {
            if !data.models.contains_key(model_id) {
                return Err(GraphError::NotFound {
                    entity: "Model",
                    id: model_id.to_string(),
                });
            }
        }
        data.twins.insert(twin_id.to_string(), twin.clone());
        Ok(())
    }

    async fn create_or_replace_relationship(
        &self,
        source_id: &str,
        relationship_id: &str,
        relationship: &serde_json::Value,
    ) -> Result<(), GraphError> {
        self.pause().await;
        self.check_rejected(relationship_id)?;
        let target_id = relationship_target_id(relationship)?;

        let mut data = guard(&self.data);
        for twin_id in [source_id, target_id] {
            if !data.twins.contains_key(twin_id) {
                return Err(GraphError::NotFound {
                    entity: "Twin",
                    id: twin_id.to_string(),
                });
            }
        }
        data.relationships.insert(
            (source_id.to_string(), relationship_id.to_string()),
            relationship.clone(),
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blobs
// ---------------------------------------------------------------------------

type BlobMap = Arc<Mutex<HashMap<String, Vec<u8>>>>;

#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: BlobMap,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, uri: &str, contents: impl Into<Vec<u8>>) {
        guard(&self.blobs).insert(uri.to_string(), contents.into());
    }

    /// Blob contents as (lossy) UTF-8.
    pub fn contents(&self, uri: &str) -> Option<String> {
        guard(&self.blobs)
            .get(uri)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn open_read(&self, uri: &str) -> Result<BlobReader, StoreError> {
        let bytes = guard(&self.blobs)
            .get(uri)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "Blob",
                id: uri.to_string(),
            })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn open_append(&self, uri: &str) -> Result<BlobWriter, StoreError> {
        guard(&self.blobs).entry(uri.to_string()).or_default();
        Ok(Box::new(MemoryBlobWriter {
            uri: uri.to_string(),
            blobs: Arc::clone(&self.blobs),
        }))
    }
}

/// Appends straight into the shared map; flushing is a no-op.
struct MemoryBlobWriter {
    uri: String,
    blobs: BlobMap,
}

impl AsyncWrite for MemoryBlobWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        guard(&self.blobs)
            .entry(self.uri.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use twingraph_core::options::ImportJobOptions;

    use super::*;

    fn new_job(id: &str) -> NewImportJob {
        NewImportJob {
            id: id.into(),
            input_blob_uri: "in.ndjson".into(),
            output_blob_uri: "out.log".into(),
            options: ImportJobOptions::default(),
            retention_hours: 24,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let store = MemoryImportJobStore::new();
        assert!(store.create(&new_job("a")).await.unwrap().is_some());
        assert!(store.create(&new_job("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_only_while_running() {
        let store = MemoryImportJobStore::new();
        store.create(&new_job("a")).await.unwrap();
        assert!(store.request_cancel("a").await.unwrap());
        assert_eq!(store.is_cancel_requested("a").await.unwrap(), Some(true));

        store
            .finish("a", ImportJobStatus::Cancelled, &ImportCounters::default(), None)
            .await
            .unwrap();
        assert!(!store.request_cancel("a").await.unwrap());
        assert_eq!(store.is_cancel_requested("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn terminal_jobs_are_never_rewritten() {
        let store = MemoryImportJobStore::new();
        store.create(&new_job("a")).await.unwrap();
        let done = ImportCounters {
            twins_created: 3,
            ..ImportCounters::default()
        };
        assert!(store
            .finish("a", ImportJobStatus::Succeeded, &done, None)
            .await
            .unwrap());

        assert!(!store.mark_running("a").await.unwrap());
        assert!(!store
            .update_progress("a", &ImportCounters::default())
            .await
            .unwrap());
        assert!(!store
            .finish("a", ImportJobStatus::Failed, &ImportCounters::default(), None)
            .await
            .unwrap());

        let record = store.get("a").await.unwrap().unwrap();
        assert_eq!(record.status, ImportJobStatus::Succeeded);
        assert_eq!(record.twins_created, 3);
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn lock_takeover_only_after_expiry() {
        let locks = MemoryLockStore::new();
        let lease = Duration::from_secs(60);
        assert!(locks.try_acquire("j", "a", lease).await.unwrap().is_some());
        assert!(locks.try_acquire("j", "b", lease).await.unwrap().is_none());
        assert!(!locks.renew("j", "b").await.unwrap());

        locks.expire("j");
        let taken = locks.try_acquire("j", "b", lease).await.unwrap().unwrap();
        assert_eq!(taken.lock_acquired_by, "b");
        assert!(!locks.renew("j", "a").await.unwrap());
    }

    #[tokio::test]
    async fn models_batch_is_all_or_nothing() {
        let graph = MemoryGraphClient::new();
        let batch = vec![
            r#"{"@id":"dtmi:x:Room;1","extends":"dtmi:x:Space;1"}"#.to_string(),
            r#"{"@id":"dtmi:x:Floor;1","extends":"dtmi:x:Missing;1"}"#.to_string(),
            r#"{"@id":"dtmi:x:Space;1"}"#.to_string(),
        ];
        assert!(graph.create_models_batch(&batch).await.is_err());
        assert!(graph.model_ids().is_empty());

        let created = graph.create_models_batch(&[batch[0].clone(), batch[2].clone()]).await;
        assert_eq!(created.unwrap(), 2);
        assert_eq!(graph.model_ids().len(), 2);
    }

    #[tokio::test]
    async fn relationship_needs_both_endpoints() {
        let graph = MemoryGraphClient::new();
        graph
            .create_or_replace_twin("a", &serde_json::json!({"$dtId": "a"}))
            .await
            .unwrap();
        let rel = serde_json::json!({"$dtId": "a", "$relationshipId": "r1", "$targetId": "b"});
        assert!(graph.create_or_replace_relationship("a", "r1", &rel).await.is_err());

        graph
            .create_or_replace_twin("b", &serde_json::json!({"$dtId": "b"}))
            .await
            .unwrap();
        graph.create_or_replace_relationship("a", "r1", &rel).await.unwrap();
        assert_eq!(graph.relationship_count(), 1);
    }

    #[tokio::test]
    async fn blob_append_accumulates() {
        let blobs = MemoryBlobStore::new();
        for chunk in ["one\n", "two\n"] {
            let mut w = blobs.open_append("log").await.unwrap();
            w.write_all(chunk.as_bytes()).await.unwrap();
        }
        let mut r = blobs.open_read("log").await.unwrap();
        let mut text = String::new();
        r.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "one\ntwo\n");
    }
}
