//! Object storage backend (MinIO/S3 compatible).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, ObjectStore};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::instrument;

use storm_common::{StormError, StormResult};

use crate::backend::{self, ByteStream, Storage};

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "storm-archives".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

impl ObjectStorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env::var("S3_ENDPOINT").unwrap_or(defaults.endpoint),
            bucket: env::var("S3_BUCKET").unwrap_or(defaults.bucket),
            access_key_id: env::var("S3_ACCESS_KEY").unwrap_or(defaults.access_key_id),
            secret_access_key: env::var("S3_SECRET_KEY").unwrap_or(defaults.secret_access_key),
            region: env::var("S3_REGION").unwrap_or(defaults.region),
            allow_http: env::var("S3_ALLOW_HTTP")
                .map(|v| v == "true")
                .unwrap_or(defaults.allow_http),
        }
    }
}

/// Object storage client for archives and model output.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> StormResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StormError::Storage(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Wrap an already-built store, e.g. an in-memory one.
    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    async fn exists(&self, path: &str) -> StormResult<bool> {
        backend::exists(self.store.as_ref(), path).await
    }

    async fn open(&self, path: &str) -> StormResult<ByteStream> {
        backend::open(self.store.as_ref(), path).await
    }

    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    async fn read(&self, path: &str) -> StormResult<Bytes> {
        backend::read(self.store.as_ref(), path).await
    }

    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    async fn write(&self, path: &str, data: Bytes) -> StormResult<()> {
        backend::write(self.store.as_ref(), path, data).await
    }

    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    async fn put_file(&self, local: &Path, path: &str) -> StormResult<u64> {
        backend::put_file(self.store.as_ref(), local, path).await
    }

    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    async fn get_file(&self, path: &str, local: &Path) -> StormResult<u64> {
        backend::get_file(self.store.as_ref(), path, local).await
    }

    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    async fn delete(&self, path: &str) -> StormResult<()> {
        backend::delete(self.store.as_ref(), path).await
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn copy_within_storage(&self, source: &str, destination: &str) -> StormResult<()> {
        backend::copy_within_storage(self.store.as_ref(), source, destination).await
    }

    async fn list(&self, prefix: &str) -> StormResult<Vec<String>> {
        backend::list(self.store.as_ref(), prefix).await
    }

    fn path(&self, path: &str) -> String {
        path.to_string()
    }

    fn storage_url(&self, path: &str) -> String {
        format!("s3://{}/{}", self.bucket, path)
    }
}
