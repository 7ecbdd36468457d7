//! Bulk import engine for the twin graph.
//!
//! An import job reads an ND-JSON document section by section (Header,
//! Models, Twins, Relationships), applies its lines to the graph store in
//! batches, checkpoints progress so an interrupted run can resume, and
//! holds a heartbeat-renewed lease so only one instance processes a job at
//! a time. A background coordinator resumes jobs whose lease lapsed.

use std::sync::Arc;

use sqlx::PgPool;

pub mod batch;
pub mod blob;
pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod lock;
pub mod log;
pub mod memory;
pub mod orchestrator;
pub mod parser;
pub mod pg;
pub mod retention;
pub mod runner;
pub mod store;

use blob::BlobStore;
use graph::GraphClient;
use store::{CheckpointStore, ImportJobStore, JobLockStore};

/// The collaborators an import run depends on.
#[derive(Clone)]
pub struct ImportServices {
    pub jobs: Arc<dyn ImportJobStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub locks: Arc<dyn JobLockStore>,
    pub graph: Arc<dyn GraphClient>,
    pub blobs: Arc<dyn BlobStore>,
}

impl ImportServices {
    /// Job records, checkpoints, leases and graph data in Postgres.
    pub fn postgres(pool: PgPool, blobs: Arc<dyn BlobStore>) -> Self {
        let store = Arc::new(pg::PgImportStore::new(pool.clone()));
        Self {
            jobs: store.clone(),
            checkpoints: store.clone(),
            locks: store,
            graph: Arc::new(pg::PgGraphClient::new(pool)),
            blobs,
        }
    }
}
