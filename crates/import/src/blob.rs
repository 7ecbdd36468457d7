//! Byte stream source/sink for import inputs and output logs.
//!
//! Cloud blob providers are adapters behind [`BlobStore`]; this crate ships
//! a local filesystem store and (in [`crate::memory`]) an in-memory one.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::StoreError;

pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BlobWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// URI scheme accepted by [`LocalBlobStore`] in addition to bare paths.
const FILE_SCHEME: &str = "file://";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a blob for reading from byte 0.
    async fn open_read(&self, uri: &str) -> Result<BlobReader, StoreError>;

    /// Open a blob for appending, creating it if needed.
    async fn open_append(&self, uri: &str) -> Result<BlobWriter, StoreError>;
}

/// Blobs stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a blob URI to a path under the root, rejecting traversal.
    pub fn resolve(&self, uri: &str) -> Result<PathBuf, StoreError> {
        let relative = uri.strip_prefix(FILE_SCHEME).unwrap_or(uri);
        let relative = Path::new(relative.trim_start_matches('/'));

        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(StoreError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("blob uri '{uri}' escapes the blob root"),
                    )))
                }
            }
        }
        if path == self.root {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("blob uri '{uri}' names no file"),
            )));
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn open_read(&self, uri: &str) -> Result<BlobReader, StoreError> {
        let path = self.resolve(uri)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                entity: "Blob",
                id: uri.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_append(&self, uri: &str) -> Result<BlobWriter, StoreError> {
        let path = self.resolve(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn resolves_file_uris_and_bare_paths() {
        let store = LocalBlobStore::new("/data/blobs");
        assert_eq!(
            store.resolve("file:///imports/a.ndjson").unwrap(),
            PathBuf::from("/data/blobs/imports/a.ndjson")
        );
        assert_eq!(
            store.resolve("imports/./a.ndjson").unwrap(),
            PathBuf::from("/data/blobs/imports/a.ndjson")
        );
    }

    #[test]
    fn rejects_traversal() {
        let store = LocalBlobStore::new("/data/blobs");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("file://").is_err());
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        for chunk in ["first\n", "second\n"] {
            let mut w = store.open_append("logs/job.log").await.unwrap();
            w.write_all(chunk.as_bytes()).await.unwrap();
            w.flush().await.unwrap();
        }

        let mut r = store.open_read("logs/job.log").await.unwrap();
        let mut text = String::new();
        r.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "first\nsecond\n");
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let err = store.open_read("nope.ndjson").await.err().unwrap();
        assert!(matches!(err, StoreError::NotFound { entity: "Blob", .. }));
    }
}
