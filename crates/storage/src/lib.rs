//! Storage abstractions for the storm archival services.
//!
//! Provides unified interfaces for:
//! - Durable file storage (local filesystem or MinIO/S3) for snapshots
//! - PostgreSQL for storm, provider, fetch-log and model-run records
//! - Redis Streams for stage task delivery

pub mod backend;
pub mod catalog;
pub mod local;
pub mod object_store;
pub mod queue;
pub mod records;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig};
pub use backend::{ByteStream, Storage, StorageConfig};
pub use catalog::Catalog;
pub use local::{LocalStorage, LocalStorageConfig};
pub use queue::{ClaimedTask, MemoryTaskQueue, RedisTaskQueue, TaskQueue};
pub use records::{MemoryRecordStore, RecordStore};
