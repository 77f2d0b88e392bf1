//! Application state for the PSA API.

use std::path::PathBuf;
use std::sync::Arc;

use archival::Archiver;
use storm_common::ArchiveSettings;

/// Shared application state.
pub struct AppState {
    /// Stage runner; owns storage, records and the task queue.
    pub archiver: Arc<Archiver>,
}

impl AppState {
    pub fn new(archiver: Arc<Archiver>) -> Self {
        Self { archiver }
    }

    pub fn settings(&self) -> &ArchiveSettings {
        self.archiver.settings()
    }

    /// Root that point-query dataset paths are resolved against.
    pub fn opendap_root(&self) -> PathBuf {
        let settings = self.settings();
        settings.data_dir.join(&settings.opendap_dir)
    }
}
