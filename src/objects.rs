//! Object storage seam for uploaded document bytes
//!
//! The production deployment fronts an S3-compatible store; that wrapper is
//! an external collaborator. The service only needs this narrow read/write
//! surface, with a filesystem implementation for development and tests.

use crate::error::{ProcessingError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Read/write access to uploaded document objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the raw bytes of a document
    async fn get(&self, campaign_id: Uuid, document_id: Uuid) -> Result<Vec<u8>>;

    /// Store the raw bytes of a document
    async fn put(&self, campaign_id: Uuid, document_id: Uuid, bytes: &[u8]) -> Result<()>;

    /// Delete a stored document object
    async fn delete(&self, campaign_id: Uuid, document_id: Uuid) -> Result<()>;
}

/// Filesystem-backed object store
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, campaign_id: Uuid, document_id: Uuid) -> PathBuf {
        self.root
            .join(campaign_id.to_string())
            .join(document_id.to_string())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, campaign_id: Uuid, document_id: Uuid) -> Result<Vec<u8>> {
        let path = self.object_path(campaign_id, document_id);
        debug!("Reading object {}", path.display());

        tokio::fs::read(&path)
            .await
            .map_err(|e| ProcessingError::StorageError(format!("{}: {}", path.display(), e)).into())
    }

    async fn put(&self, campaign_id: Uuid, document_id: Uuid, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(campaign_id, document_id);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProcessingError::StorageError(e.to_string()))?;
        }

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ProcessingError::StorageError(format!("{}: {}", path.display(), e)).into())
    }

    async fn delete(&self, campaign_id: Uuid, document_id: Uuid) -> Result<()> {
        let path = self.object_path(campaign_id, document_id);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProcessingError::StorageError(e.to_string()).into()),
        }
    }
}
