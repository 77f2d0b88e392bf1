//! Acquisition and archival stages for storm covered data and model output.
//!
//! Per category requirement of a storm, covered data moves through
//! `fetch -> archive -> combine`; model output uploaded for a run goes
//! through validation and `extract`. Stages run as queue tasks under a
//! fixed-delay [`RetryPolicy`] and are safe to repeat.

pub mod archiver;
pub mod discovery;
pub mod dispatch;
pub mod retry;
pub mod selection;
pub mod snapshot;
pub mod validation;

pub use archiver::{Archiver, FetchReport};
pub use discovery::{discover, matching_links, DiscoveredDataset};
pub use dispatch::{TaskDispatcher, TaskOutput};
pub use retry::RetryPolicy;
pub use selection::select_latest_snapshots;
pub use validation::validate_model_output;
