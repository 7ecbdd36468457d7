//! Postgres-backed collaborators over the `twingraph-db` repositories.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use twingraph_core::checkpoint::ImportJobCheckpoint;
use twingraph_core::import_job::{ImportJobRecord, JobError, NewImportJob, JOB_TYPE_IMPORT};
use twingraph_core::job_lock::{lease_secs, JobLockInfo};
use twingraph_core::job_state::ImportCounters;
use twingraph_core::model_deps::{order_models, parse_model};
use twingraph_core::status::ImportJobStatus;
use twingraph_core::types::Timestamp;
use twingraph_db::models::graph::UpsertRelationship;
use twingraph_db::models::import_job::{ImportJobListQuery, ImportJobRow};
use twingraph_db::repositories::{CheckpointRepo, GraphRepo, ImportJobRepo, JobLockRepo};

use crate::error::{GraphError, StoreError};
use crate::graph::{relationship_name, relationship_target_id, twin_model_id, GraphClient};
use crate::store::{CheckpointStore, ImportJobStore, JobLockStore};

fn to_record(row: ImportJobRow) -> Result<ImportJobRecord, StoreError> {
    Ok(ImportJobRecord::try_from(row)?)
}

/// Job records, checkpoints and leases in one Postgres database.
#[derive(Debug, Clone)]
pub struct PgImportStore {
    pool: PgPool,
}

impl PgImportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImportJobStore for PgImportStore {
    async fn create(&self, job: &NewImportJob) -> Result<Option<ImportJobRecord>, StoreError> {
        ImportJobRepo::create(&self.pool, JOB_TYPE_IMPORT, job)
            .await?
            .map(to_record)
            .transpose()
    }

    async fn get(&self, id: &str) -> Result<Option<ImportJobRecord>, StoreError> {
        ImportJobRepo::find_by_id(&self.pool, id)
            .await?
            .map(to_record)
            .transpose()
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ImportJobRecord>, StoreError> {
        let params = ImportJobListQuery {
            limit: Some(limit),
            offset: Some(offset),
        };
        ImportJobRepo::list(&self.pool, &params)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn list_running_imports(&self) -> Result<Vec<ImportJobRecord>, StoreError> {
        ImportJobRepo::list_running(&self.pool, JOB_TYPE_IMPORT)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn mark_running(&self, id: &str) -> Result<bool, StoreError> {
        Ok(ImportJobRepo::mark_running(&self.pool, id).await?)
    }

    async fn update_progress(
        &self,
        id: &str,
        counters: &ImportCounters,
    ) -> Result<bool, StoreError> {
        Ok(ImportJobRepo::update_progress(&self.pool, id, counters).await?)
    }

    async fn finish(
        &self,
        id: &str,
        status: ImportJobStatus,
        counters: &ImportCounters,
        error: Option<&JobError>,
    ) -> Result<bool, StoreError> {
        Ok(ImportJobRepo::finish(&self.pool, id, status, counters, error).await?)
    }

    async fn request_cancel(&self, id: &str) -> Result<bool, StoreError> {
        Ok(ImportJobRepo::request_cancel(&self.pool, id).await?)
    }

    async fn is_cancel_requested(&self, id: &str) -> Result<Option<bool>, StoreError> {
        Ok(ImportJobRepo::is_cancel_requested(&self.pool, id).await?)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(ImportJobRepo::delete(&self.pool, id).await?)
    }

    async fn delete_purgeable(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        Ok(ImportJobRepo::delete_purgeable(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl CheckpointStore for PgImportStore {
    async fn load(&self, job_id: &str) -> Result<Option<ImportJobCheckpoint>, StoreError> {
        match CheckpointRepo::find_by_job(&self.pool, job_id).await? {
            Some(row) => Ok(Some(ImportJobCheckpoint::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, checkpoint: &ImportJobCheckpoint) -> Result<(), StoreError> {
        Ok(CheckpointRepo::save(&self.pool, checkpoint).await?)
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(CheckpointRepo::delete(&self.pool, job_id).await?)
    }
}

#[async_trait]
impl JobLockStore for PgImportStore {
    async fn try_acquire(
        &self,
        job_id: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<Option<JobLockInfo>, StoreError> {
        let row = JobLockRepo::try_acquire(&self.pool, job_id, holder, lease_secs(lease)).await?;
        Ok(row.map(JobLockInfo::from))
    }

    async fn renew(&self, job_id: &str, holder: &str) -> Result<bool, StoreError> {
        Ok(JobLockRepo::renew(&self.pool, job_id, holder).await?)
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobLockInfo>, StoreError> {
        Ok(JobLockRepo::find(&self.pool, job_id)
            .await?
            .map(JobLockInfo::from))
    }

    async fn release(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(JobLockRepo::release(&self.pool, job_id).await?)
    }
}

/// Graph writes against the `graph_*` tables.
#[derive(Debug, Clone)]
pub struct PgGraphClient {
    pool: PgPool,
}

impl PgGraphClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphClient for PgGraphClient {
    async fn create_models_batch(&self, models: &[String]) -> Result<u64, GraphError> {
        let descriptors = models
            .iter()
            .enumerate()
            .map(|(i, raw)| parse_model(i, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut external: Vec<String> = descriptors
            .iter()
            .flat_map(|m| m.dependencies.iter().cloned())
            .collect();
        external.sort();
        external.dedup();
        let stored = GraphRepo::existing_model_ids(&self.pool, &external).await?;

        let ordered = order_models(descriptors, |id| stored.iter().any(|s| s == id))?;
        let rows: Vec<(String, serde_json::Value)> =
            ordered.into_iter().map(|m| (m.id, m.body)).collect();
        Ok(GraphRepo::upsert_models(&self.pool, &rows).await?)
    }

    async fn create_or_replace_twin(
        &self,
        twin_id: &str,
        twin: &serde_json::Value,
    ) -> Result<(), GraphError> {
        if !twin.is_object() {
            return Err(GraphError::Invalid {
                kind: "twin",
                reason: "not a JSON object".into(),
            });
        }
        let model_id = twin_model_id(twin);
        if let Some(model_id) = model_id {
            if !GraphRepo::model_exists(&self.pool, model_id).await? {
                return Err(GraphError::NotFound {
                    entity: "Model",
                    id: model_id.to_string(),
                });
            }
        }
        let etag = GraphRepo::upsert_twin(&self.pool, twin_id, model_id, twin).await?;
        tracing::trace!(twin_id, %etag, "Twin written");
        Ok(())
    }

    async fn create_or_replace_relationship(
        &self,
        source_id: &str,
        relationship_id: &str,
        relationship: &serde_json::Value,
    ) -> Result<(), GraphError> {
        let target_id = relationship_target_id(relationship)?;
        for twin_id in [source_id, target_id] {
            if !GraphRepo::twin_exists(&self.pool, twin_id).await? {
                return Err(GraphError::NotFound {
                    entity: "Twin",
                    id: twin_id.to_string(),
                });
            }
        }
        let input = UpsertRelationship {
            source_id,
            relationship_id,
            target_id,
            name: relationship_name(relationship),
            relationship,
        };
        let etag = GraphRepo::upsert_relationship(&self.pool, &input).await?;
        tracing::trace!(source_id, relationship_id, %etag, "Relationship written");
        Ok(())
    }
}
