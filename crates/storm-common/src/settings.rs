//! Archive layout settings.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::StormResult;

/// Directory names and local roots shared by the worker and the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Local working storage root.
    pub data_dir: PathBuf,
    /// Staging directory (under `data_dir`) for in-progress fetches.
    pub incomplete_dir: String,
    /// Upload area for model output, relative to the storm in storage.
    pub upload_dir: String,
    /// Storage directory for dated category snapshots.
    pub covered_archive_dir: String,
    /// Per-run directory receiving combined covered-data snapshots.
    pub covered_data_dir: String,
    /// Per-run directory receiving extracted model output.
    pub psa_dir: String,
    /// Directory (under `data_dir`) served to point queries.
    pub opendap_dir: String,
    /// Extension of every archive the pipeline reads or writes.
    pub archive_extension: String,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data/storms"),
            incomplete_dir: "incomplete".to_string(),
            upload_dir: "upload".to_string(),
            covered_archive_dir: "covered-data-archive".to_string(),
            covered_data_dir: "covered-data".to_string(),
            psa_dir: "psa".to_string(),
            opendap_dir: "opendap".to_string(),
            archive_extension: "tgz".to_string(),
        }
    }
}

impl ArchiveSettings {
    /// Load settings from a YAML file; missing keys take defaults.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> StormResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |key: &str, default: String| env::var(key).unwrap_or(default);

        Self {
            data_dir: env::var("STORM_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            incomplete_dir: var("STORM_INCOMPLETE_DIR", defaults.incomplete_dir),
            upload_dir: var("STORM_UPLOAD_DIR", defaults.upload_dir),
            covered_archive_dir: var("STORM_COVERED_ARCHIVE_DIR", defaults.covered_archive_dir),
            covered_data_dir: var("STORM_COVERED_DATA_DIR", defaults.covered_data_dir),
            psa_dir: var("STORM_PSA_DIR", defaults.psa_dir),
            opendap_dir: var("STORM_OPENDAP_DIR", defaults.opendap_dir),
            archive_extension: var("STORM_ARCHIVE_EXTENSION", defaults.archive_extension),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_partial_override() {
        let dir = std::env::temp_dir().join(format!("storm-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.yaml");
        std::fs::write(&path, "data_dir: /tmp/storms\narchive_extension: tar.gz\n").unwrap();

        let settings = ArchiveSettings::from_yaml(&path).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/storms"));
        assert_eq!(settings.archive_extension, "tar.gz");
        assert_eq!(settings.psa_dir, "psa");

        std::fs::remove_dir_all(&dir).ok();
    }
}
