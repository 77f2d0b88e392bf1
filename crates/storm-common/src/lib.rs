//! Common types and utilities shared across the storm archival services.

pub mod bbox;
pub mod error;
pub mod model;
pub mod paths;
pub mod settings;
pub mod tasks;
pub mod time;

pub use bbox::BoundingBox;
pub use error::{StormError, StormResult};
pub use model::{
    CategoryRequirement, FetchLog, ModelRun, NewFetchLog, ProcessorKind, ProviderSource,
    SourceProtocol, StormEvent,
};
pub use paths::StoragePath;
pub use settings::ArchiveSettings;
pub use time::{CfTimeUnits, TimeWindow};
pub use tasks::{FetchTask, FieldSpec, ProcessorParams, TaskEnvelope, TaskMessage};
