//! Storage contract shared by the local-filesystem and object-store backends.
//!
//! Both backends sit on top of an [`ObjectStore`] so the orchestrator sees
//! identical semantics; they differ only in how paths are rendered for
//! callers (`path`) and for humans (`storage_url`).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::{path::Path as ObjectPath, ObjectStore};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use storm_common::{StormError, StormResult};

use crate::local::{LocalStorage, LocalStorageConfig};
use crate::object_store::{ObjectStorage, ObjectStorageConfig};

/// Stream of chunks read from storage.
pub type ByteStream = BoxStream<'static, StormResult<Bytes>>;

/// Durable storage for snapshots and model output.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check if an object exists.
    async fn exists(&self, path: &str) -> StormResult<bool>;

    /// Open an object for streaming reads.
    async fn open(&self, path: &str) -> StormResult<ByteStream>;

    /// Read a whole object into memory.
    async fn read(&self, path: &str) -> StormResult<Bytes>;

    /// Write (or overwrite) an object.
    async fn write(&self, path: &str, data: Bytes) -> StormResult<()>;

    /// Stream a local file into storage. Returns bytes written.
    async fn put_file(&self, local: &Path, path: &str) -> StormResult<u64>;

    /// Stream an object down to a local file. Returns bytes written.
    async fn get_file(&self, path: &str, local: &Path) -> StormResult<u64>;

    /// Delete an object; deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> StormResult<()>;

    /// Copy `source` to `destination`, removing any existing destination first.
    async fn copy_within_storage(&self, source: &str, destination: &str) -> StormResult<()>;

    /// List object paths under a prefix.
    async fn list(&self, prefix: &str) -> StormResult<Vec<String>>;

    /// Backend-specific absolute form of a storage path.
    fn path(&self, path: &str) -> String;

    /// Addressable URL/URI of a storage path.
    fn storage_url(&self, path: &str) -> String;
}

/// Which backend to build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Local(LocalStorageConfig),
    Object(ObjectStorageConfig),
}

impl StorageConfig {
    /// Pick a backend from `STORAGE_BACKEND` ("local" or "s3").
    pub fn from_env() -> Self {
        match std::env::var("STORAGE_BACKEND").as_deref() {
            Ok("s3") | Ok("object") => StorageConfig::Object(ObjectStorageConfig::from_env()),
            _ => StorageConfig::Local(LocalStorageConfig::from_env()),
        }
    }

    pub fn build(&self) -> StormResult<Arc<dyn Storage>> {
        Ok(match self {
            StorageConfig::Local(config) => Arc::new(LocalStorage::new(config)?),
            StorageConfig::Object(config) => Arc::new(ObjectStorage::new(config)?),
        })
    }
}

// =============================================================================
// Shared object_store operations
// =============================================================================

pub(crate) fn map_err(path: &str, op: &str, err: object_store::Error) -> StormError {
    match err {
        object_store::Error::NotFound { .. } => StormError::NotFound(path.to_string()),
        e => StormError::Storage(format!("Failed to {} {}: {}", op, path, e)),
    }
}

pub(crate) async fn exists(store: &dyn ObjectStore, path: &str) -> StormResult<bool> {
    match store.head(&ObjectPath::from(path)).await {
        Ok(_) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(map_err(path, "check", e)),
    }
}

pub(crate) async fn open(store: &dyn ObjectStore, path: &str) -> StormResult<ByteStream> {
    let owned = path.to_string();
    let result = store
        .get(&ObjectPath::from(path))
        .await
        .map_err(|e| map_err(path, "read", e))?;

    Ok(result
        .into_stream()
        .map_err(move |e| map_err(&owned, "read", e))
        .boxed())
}

pub(crate) async fn read(store: &dyn ObjectStore, path: &str) -> StormResult<Bytes> {
    let result = store
        .get(&ObjectPath::from(path))
        .await
        .map_err(|e| map_err(path, "read", e))?;

    let bytes = result.bytes().await.map_err(|e| map_err(path, "read", e))?;
    debug!(path = %path, size = bytes.len(), "Read object");
    Ok(bytes)
}

pub(crate) async fn write(store: &dyn ObjectStore, path: &str, data: Bytes) -> StormResult<()> {
    debug!(path = %path, size = data.len(), "Writing object");
    store
        .put(&ObjectPath::from(path), data)
        .await
        .map_err(|e| map_err(path, "write", e))?;
    Ok(())
}

pub(crate) async fn put_file(store: &dyn ObjectStore, local: &Path, path: &str) -> StormResult<u64> {
    let location = ObjectPath::from(path);
    let mut file = tokio::fs::File::open(local).await?;

    let (multipart_id, mut writer) = store
        .put_multipart(&location)
        .await
        .map_err(|e| map_err(path, "upload", e))?;

    let copied = match tokio::io::copy(&mut file, &mut writer).await {
        Ok(n) => n,
        Err(e) => {
            warn!(path = %path, error = %e, "Upload failed, aborting multipart");
            store.abort_multipart(&location, &multipart_id).await.ok();
            return Err(StormError::Storage(format!("Failed to upload {}: {}", path, e)));
        }
    };

    writer
        .shutdown()
        .await
        .map_err(|e| StormError::Storage(format!("Failed to finish upload {}: {}", path, e)))?;

    debug!(path = %path, local = %local.display(), size = copied, "Uploaded file");
    Ok(copied)
}

pub(crate) async fn get_file(store: &dyn ObjectStore, path: &str, local: &Path) -> StormResult<u64> {
    if let Some(parent) = local.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut stream = open(store, path).await?;
    let mut file = tokio::fs::File::create(local).await?;
    let mut total = 0u64;

    while let Some(chunk) = stream.try_next().await? {
        file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;

    debug!(path = %path, local = %local.display(), size = total, "Downloaded object");
    Ok(total)
}

pub(crate) async fn delete(store: &dyn ObjectStore, path: &str) -> StormResult<()> {
    match store.delete(&ObjectPath::from(path)).await {
        Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
        Err(e) => Err(map_err(path, "delete", e)),
    }
}

pub(crate) async fn copy_within_storage(
    store: &dyn ObjectStore,
    source: &str,
    destination: &str,
) -> StormResult<()> {
    if exists(store, destination).await? {
        delete(store, destination).await?;
    }

    store
        .copy(&ObjectPath::from(source), &ObjectPath::from(destination))
        .await
        .map_err(|e| map_err(source, "copy", e))?;

    debug!(source = %source, destination = %destination, "Copied object");
    Ok(())
}

pub(crate) async fn list(store: &dyn ObjectStore, prefix: &str) -> StormResult<Vec<String>> {
    let prefix_path = ObjectPath::from(prefix);
    let mut paths = Vec::new();

    let mut stream = store.list(Some(&prefix_path));
    while let Some(meta) = stream
        .try_next()
        .await
        .map_err(|e| map_err(prefix, "list", e))?
    {
        paths.push(meta.location.to_string());
    }

    paths.sort();
    Ok(paths)
}
