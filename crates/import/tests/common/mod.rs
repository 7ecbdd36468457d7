#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::sync::CancellationToken;
use twingraph_core::import_job::{ImportJobRecord, NewImportJob};
use twingraph_core::options::ImportJobOptions;
use twingraph_import::blob::{BlobReader, BlobStore};
use twingraph_import::config::ImportConfig;
use twingraph_import::memory::{
    MemoryBlobStore, MemoryCheckpointStore, MemoryGraphClient, MemoryImportJobStore,
    MemoryLockStore,
};
use twingraph_import::orchestrator::{ImportJobOrchestrator, ImportOutcome};
use twingraph_import::runner::{ImportJobRegistry, ImportJobRunner};
use twingraph_import::store::ImportJobStore;
use twingraph_import::ImportServices;

pub const JOB_ID: &str = "job-1";
pub const INPUT: &str = "imports/job-1.ndjson";
pub const OUTPUT: &str = "logs/job-1.log";

/// In-memory collaborators plus typed handles for assertions.
pub struct Harness {
    pub jobs: Arc<MemoryImportJobStore>,
    pub checkpoints: Arc<MemoryCheckpointStore>,
    pub locks: Arc<MemoryLockStore>,
    pub graph: Arc<MemoryGraphClient>,
    pub blobs: MemoryBlobStore,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(MemoryImportJobStore::new()),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            locks: Arc::new(MemoryLockStore::new()),
            graph: Arc::new(MemoryGraphClient::new()),
            blobs: MemoryBlobStore::new(),
        }
    }

    pub fn services(&self) -> ImportServices {
        ImportServices {
            jobs: self.jobs.clone(),
            checkpoints: self.checkpoints.clone(),
            locks: self.locks.clone(),
            graph: self.graph.clone(),
            blobs: Arc::new(self.blobs.clone()),
        }
    }

    pub fn orchestrator(&self) -> ImportJobOrchestrator {
        ImportJobOrchestrator::new(self.jobs.clone(), self.checkpoints.clone(), self.graph.clone())
    }

    pub fn runner(&self, instance_id: &str) -> ImportJobRunner {
        let config = ImportConfig {
            instance_id: instance_id.to_string(),
            lock_lease: Duration::from_secs(150),
            heartbeat_interval: Duration::from_secs(60),
            cancel_poll_interval: Duration::from_millis(10),
            ..ImportConfig::default()
        };
        ImportJobRunner::new(self.services(), &config, ImportJobRegistry::new())
    }

    /// Store `input` and create the job record.
    pub async fn create_job(&self, input: &str, options: ImportJobOptions) -> ImportJobRecord {
        self.blobs.put(INPUT, input);
        self.jobs
            .create(&NewImportJob {
                id: JOB_ID.into(),
                input_blob_uri: INPUT.into(),
                output_blob_uri: OUTPUT.into(),
                options,
                retention_hours: 24,
            })
            .await
            .unwrap()
            .unwrap()
    }

    /// Run the orchestrator over the full input.
    pub async fn run(&self, job: &ImportJobRecord) -> ImportOutcome {
        let input = self.blobs.open_read(INPUT).await.unwrap();
        self.run_with(job, input).await.unwrap()
    }

    pub async fn run_with(
        &self,
        job: &ImportJobRecord,
        input: BlobReader,
    ) -> Result<ImportOutcome, twingraph_import::error::StoreError> {
        let output = self.blobs.open_append(OUTPUT).await.unwrap();
        self.orchestrator()
            .run(job, input, output, &CancellationToken::new())
            .await
    }

    /// Output log lines parsed as JSON.
    pub fn log_lines(&self) -> Vec<serde_json::Value> {
        self.blobs
            .contents(OUTPUT)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

/// Build an import document from its data sections.
pub fn document(models: &[&str], twins: &[&str], relationships: &[&str]) -> String {
    let mut doc = String::from("{\"Section\":\"Header\"}\n{\"fileVersion\":\"1.0.0\",\"author\":\"tests\"}\n");
    for (marker, lines) in [
        ("Models", models),
        ("Twins", twins),
        ("Relationships", relationships),
    ] {
        if lines.is_empty() {
            continue;
        }
        doc.push_str(&format!("{{\"Section\":\"{marker}\"}}\n"));
        for line in lines {
            doc.push_str(line);
            doc.push('\n');
        }
    }
    doc
}

pub fn twin(id: &str) -> String {
    format!(r#"{{"$dtId":"{id}","$metadata":{{"$model":"dtmi:test:Room;1"}}}}"#)
}

pub fn relationship(source: &str, id: &str, target: &str) -> String {
    format!(r#"{{"$dtId":"{source}","$relationshipId":"{id}","$targetId":"{target}"}}"#)
}

pub const ROOM_MODEL: &str = r#"{"@id":"dtmi:test:Room;1","@type":"Interface","extends":"dtmi:test:Space;1"}"#;
pub const SPACE_MODEL: &str = r#"{"@id":"dtmi:test:Space;1","@type":"Interface"}"#;

/// Reader that yields the first `lines` lines of `input`, then fails as if
/// the process had died mid-read.
pub fn crashing_reader(input: &str, lines: usize) -> BlobReader {
    let prefix: String = input.split_inclusive('\n').take(lines).collect();
    Box::new(io::Cursor::new(prefix.into_bytes()).chain(Crash))
}

struct Crash;

impl AsyncRead for Crash {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "crash")))
    }
}
