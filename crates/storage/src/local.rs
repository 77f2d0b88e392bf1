//! Local-filesystem storage backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use storm_common::{StormError, StormResult};

use crate::backend::{self, ByteStream, Storage};

/// Configuration for the local-filesystem backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory holding every stored object.
    pub root: PathBuf,
    /// URL prefix under which `root` is served.
    pub media_url: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/data/storage"),
            media_url: "/media/".to_string(),
        }
    }
}

impl LocalStorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: std::env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            media_url: std::env::var("STORAGE_MEDIA_URL").unwrap_or(defaults.media_url),
        }
    }
}

/// Storage rooted at a local directory.
pub struct LocalStorage {
    store: Arc<LocalFileSystem>,
    root: PathBuf,
    media_url: String,
}

impl LocalStorage {
    /// Create the root directory if needed and open the backend.
    pub fn new(config: &LocalStorageConfig) -> StormResult<Self> {
        std::fs::create_dir_all(&config.root)?;

        let store = LocalFileSystem::new_with_prefix(&config.root).map_err(|e| {
            StormError::Storage(format!(
                "Failed to open local storage at {}: {}",
                config.root.display(),
                e
            ))
        })?;

        Ok(Self {
            store: Arc::new(store),
            root: config.root.clone(),
            media_url: config.media_url.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, path: &str) -> StormResult<bool> {
        backend::exists(self.store.as_ref(), path).await
    }

    async fn open(&self, path: &str) -> StormResult<ByteStream> {
        backend::open(self.store.as_ref(), path).await
    }

    async fn read(&self, path: &str) -> StormResult<Bytes> {
        backend::read(self.store.as_ref(), path).await
    }

    #[instrument(skip(self, data), fields(root = %self.root.display(), path = %path))]
    async fn write(&self, path: &str, data: Bytes) -> StormResult<()> {
        backend::write(self.store.as_ref(), path, data).await
    }

    #[instrument(skip(self), fields(root = %self.root.display(), path = %path))]
    async fn put_file(&self, local: &Path, path: &str) -> StormResult<u64> {
        backend::put_file(self.store.as_ref(), local, path).await
    }

    #[instrument(skip(self), fields(root = %self.root.display(), path = %path))]
    async fn get_file(&self, path: &str, local: &Path) -> StormResult<u64> {
        backend::get_file(self.store.as_ref(), path, local).await
    }

    #[instrument(skip(self), fields(root = %self.root.display(), path = %path))]
    async fn delete(&self, path: &str) -> StormResult<()> {
        backend::delete(self.store.as_ref(), path).await
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn copy_within_storage(&self, source: &str, destination: &str) -> StormResult<()> {
        backend::copy_within_storage(self.store.as_ref(), source, destination).await
    }

    async fn list(&self, prefix: &str) -> StormResult<Vec<String>> {
        backend::list(self.store.as_ref(), prefix).await
    }

    fn path(&self, path: &str) -> String {
        self.root.join(path).display().to_string()
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}{}", self.media_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(&LocalStorageConfig {
            root: dir.path().to_path_buf(),
            media_url: "/media/".to_string(),
        })
        .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_write_read_exists_delete() {
        let (_dir, storage) = storage();

        assert!(!storage.exists("Harvey/upload/v1.tgz").await.unwrap());
        storage
            .write("Harvey/upload/v1.tgz", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert!(storage.exists("Harvey/upload/v1.tgz").await.unwrap());
        assert_eq!(storage.read("Harvey/upload/v1.tgz").await.unwrap(), "payload");

        storage.delete("Harvey/upload/v1.tgz").await.unwrap();
        assert!(!storage.exists("Harvey/upload/v1.tgz").await.unwrap());
        // deleting twice is fine
        storage.delete("Harvey/upload/v1.tgz").await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_replaces_existing_destination() {
        let (_dir, storage) = storage();

        storage.write("a/src.tgz", Bytes::from_static(b"new")).await.unwrap();
        storage.write("b/dst.tgz", Bytes::from_static(b"old contents")).await.unwrap();

        storage.copy_within_storage("a/src.tgz", "b/dst.tgz").await.unwrap();

        assert_eq!(storage.read("b/dst.tgz").await.unwrap(), "new");
        assert!(storage.exists("a/src.tgz").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_missing_source_is_not_found() {
        let (_dir, storage) = storage();
        let err = storage.copy_within_storage("missing.tgz", "dst.tgz").await.unwrap_err();
        assert!(matches!(err, StormError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_put_and_get_file_stream() {
        let (dir, storage) = storage();
        let local = dir.path().join("local.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&local, &data).unwrap();

        let written = storage.put_file(&local, "big/file.bin").await.unwrap();
        assert_eq!(written, data.len() as u64);

        let out = dir.path().join("out/file.bin");
        let read = storage.get_file("big/file.bin", &out).await.unwrap();
        assert_eq!(read, data.len() as u64);
        assert_eq!(std::fs::read(&out).unwrap(), data);

        let chunks: Vec<Bytes> = storage.open("big/file.bin").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), data.len());
    }

    #[tokio::test]
    async fn test_paths_and_urls() {
        let (dir, storage) = storage();
        assert_eq!(
            storage.path("Harvey/v1/psa"),
            dir.path().join("Harvey/v1/psa").display().to_string()
        );
        assert_eq!(storage.storage_url("Harvey/v1/psa"), "/media/Harvey/v1/psa");
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let (_dir, storage) = storage();
        storage.write("x/1.tgz", Bytes::from_static(b"1")).await.unwrap();
        storage.write("x/2.tgz", Bytes::from_static(b"2")).await.unwrap();
        storage.write("y/3.tgz", Bytes::from_static(b"3")).await.unwrap();
        assert_eq!(storage.list("x").await.unwrap(), vec!["x/1.tgz", "x/2.tgz"]);
    }
}
