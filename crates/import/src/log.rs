//! Append-only per-job output log.

use tokio::io::AsyncWriteExt;
use twingraph_core::job_log::ImportLogEntry;

use crate::blob::BlobWriter;

/// Writes one JSON object per line and flushes after each.
///
/// A failed write is reported through tracing and never fails the job.
pub struct JobLogWriter {
    job_id: String,
    writer: BlobWriter,
    failures: u64,
}

impl JobLogWriter {
    pub fn new(job_id: &str, writer: BlobWriter) -> Self {
        Self {
            job_id: job_id.to_string(),
            writer,
            failures: 0,
        }
    }

    /// Number of lines that could not be written.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub async fn write(&mut self, entry: &ImportLogEntry) {
        let line = match entry.to_line() {
            Ok(line) => line,
            Err(e) => {
                self.failures += 1;
                tracing::warn!(job_id = %self.job_id, error = %e, "Failed to encode job log entry");
                return;
            }
        };
        let result = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await
        }
        .await;
        if let Err(e) = result {
            self.failures += 1;
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to write job log entry");
        }
    }

    pub async fn info(&mut self, details: serde_json::Value) {
        let entry = ImportLogEntry::info(&self.job_id, details);
        self.write(&entry).await;
    }

    pub async fn warning(&mut self, details: serde_json::Value) {
        let entry = ImportLogEntry::warning(&self.job_id, details);
        self.write(&entry).await;
    }

    pub async fn error(&mut self, details: serde_json::Value) {
        let entry = ImportLogEntry::error(&self.job_id, details);
        self.write(&entry).await;
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use serde_json::json;
    use tokio::io::AsyncWrite;

    use super::*;
    use crate::blob::BlobStore;
    use crate::memory::MemoryBlobStore;

    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "gone",
            )))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        let blobs = MemoryBlobStore::new();
        let mut log = JobLogWriter::new("job-1", blobs.open_append("out").await.unwrap());
        log.info(json!({"status": "started"})).await;
        log.error(json!({"lineNumber": 7, "message": "bad"})).await;

        let text = blobs.contents("out").unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["jobType"], "Import");
        assert_eq!(lines[0]["logType"], "Info");
        assert_eq!(lines[1]["logType"], "Error");
        assert_eq!(lines[1]["details"]["lineNumber"], 7);
    }

    #[tokio::test]
    async fn write_failure_is_absorbed() {
        let mut log = JobLogWriter::new("job-1", Box::new(BrokenWriter));
        log.warning(json!({"message": "lost"})).await;
        assert_eq!(log.failures(), 1);
    }
}
