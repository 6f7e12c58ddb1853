//! Raw upload storage.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

/// Key -> bytes storage for original uploads. The core never reads blobs
/// back; they are kept for download and audit surfaces outside this crate.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ApiError>;
}

/// Filesystem-backed blob store rooted under the data directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(paths: &AppPaths) -> Self {
        Self::at(paths.blob_dir.clone())
    }

    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ApiError> {
        if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
            return Err(ApiError::StorageWriteFailed(format!(
                "invalid blob key: {:?}",
                key
            )));
        }

        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::StorageWriteFailed(e.to_string()))?;
        }

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ApiError::StorageWriteFailed(e.to_string()))?;

        tracing::debug!("stored blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }
}
