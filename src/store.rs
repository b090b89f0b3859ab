//! Blob-store boundary.
//!
//! The production deployment talks to two remote object buckets (public
//! delivery and private cache) behind this trait; the pipeline only ever
//! needs put/get/exists by key. [`FsBlobStore`] is the filesystem
//! implementation used for local runs and tests.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Errors crossing the blob-store boundary, opaque to the pipeline.
pub type BlobError = Box<dyn std::error::Error + Send + Sync>;

/// Remote object namespace: put/get/exists by key.
///
/// Keys are content-derived and writes are idempotent, so concurrent
/// writers racing on the same key are harmless.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobError>;
}

/// Filesystem-backed store: keys become paths under a root directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), BlobError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        debug!(key, path = %path.display(), "Stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Ok(fs::try_exists(self.path_for(key)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_exists_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        assert!(!store.exists("ns/key.pad").await.unwrap());
        assert_eq!(store.get("ns/key.pad").await.unwrap(), None);

        store
            .put("ns/key.pad", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        assert!(store.exists("ns/key.pad").await.unwrap());
        assert_eq!(store.get("ns/key.pad").await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_put_is_idempotent_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("k", vec![9], "image/jpeg").await.unwrap();
        store.put("k", vec![9], "image/jpeg").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(vec![9]));
    }
}
