//! Canonical storage and staging path conventions.
//!
//! These layouts are shared with external model operators and catalog
//! servers and must not drift.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::{ArchiveSettings, ModelRun};

/// Path builder for consistent storage layout.
pub struct StoragePath;

impl StoragePath {
    /// Uploaded model output.
    /// Format: {storm}/{upload_dir}/v{run}.{ext}
    pub fn model_output_upload(settings: &ArchiveSettings, storm: &str, run: &ModelRun) -> String {
        format!(
            "{}/{}/{}.{}",
            storm,
            settings.upload_dir,
            run.version(),
            settings.archive_extension
        )
    }

    /// Dated snapshot archive of one category.
    /// Format: {covered_archive_dir}/{storm}/{category}-{YYYY-MM-DD}.{ext}
    pub fn category_snapshot(
        settings: &ArchiveSettings,
        storm: &str,
        category: &str,
        date: NaiveDate,
    ) -> String {
        format!(
            "{}/{}/{}",
            settings.covered_archive_dir,
            storm,
            Self::category_snapshot_name(settings, category, date)
        )
    }

    /// File name of a dated category snapshot.
    pub fn category_snapshot_name(settings: &ArchiveSettings, category: &str, date: NaiveDate) -> String {
        format!(
            "{}-{}.{}",
            category,
            date.format("%Y-%m-%d"),
            settings.archive_extension
        )
    }

    /// Combined covered-data directory of a run.
    /// Format: {storm}/v{run}/{covered_data_dir}
    pub fn run_covered_data(settings: &ArchiveSettings, storm: &str, run: &ModelRun) -> String {
        format!("{}/{}/{}", storm, run.version(), settings.covered_data_dir)
    }

    /// Extracted model output directory of a run.
    /// Format: {storm}/v{run}/{psa_dir}
    pub fn run_psa(settings: &ArchiveSettings, storm: &str, run: &ModelRun) -> String {
        format!("{}/{}/{}", storm, run.version(), settings.psa_dir)
    }

    /// Local staging directory of one category.
    pub fn staging_category(settings: &ArchiveSettings, storm: &str, category: &str) -> PathBuf {
        settings
            .data_dir
            .join(&settings.incomplete_dir)
            .join(storm)
            .join(category)
    }

    /// Local staging directory of one provider within a category. Providers
    /// of the same category never share a directory.
    pub fn staging_provider(
        settings: &ArchiveSettings,
        storm: &str,
        category: &str,
        provider_id: i64,
    ) -> PathBuf {
        Self::staging_category(settings, storm, category).join(format!("provider-{}", provider_id))
    }

    /// Local working directory of a run's versioned output.
    pub fn local_run_psa(settings: &ArchiveSettings, storm: &str, run: &ModelRun) -> PathBuf {
        settings
            .data_dir
            .join(storm)
            .join(run.version())
            .join(&settings.psa_dir)
    }
}

/// Last path component of a `/`-separated storage path.
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_paths() {
        let settings = ArchiveSettings::default();
        let run = ModelRun::new(68, 1);

        assert_eq!(
            StoragePath::model_output_upload(&settings, "Harvey", &run),
            "Harvey/upload/v68.tgz"
        );
        assert_eq!(
            StoragePath::category_snapshot(
                &settings,
                "Harvey",
                "Winds",
                NaiveDate::from_ymd_opt(2020, 1, 3).unwrap()
            ),
            "covered-data-archive/Harvey/Winds-2020-01-03.tgz"
        );
        assert_eq!(
            StoragePath::run_covered_data(&settings, "Harvey", &run),
            "Harvey/v68/covered-data"
        );
        assert_eq!(StoragePath::run_psa(&settings, "Harvey", &run), "Harvey/v68/psa");
    }

    #[test]
    fn test_staging_path() {
        let settings = ArchiveSettings::default();
        assert_eq!(
            StoragePath::staging_category(&settings, "Harvey", "Winds"),
            PathBuf::from("/data/storms/incomplete/Harvey/Winds")
        );
        assert_eq!(
            StoragePath::staging_provider(&settings, "Harvey", "Winds", 7),
            PathBuf::from("/data/storms/incomplete/Harvey/Winds/provider-7")
        );
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("a/b/c.tgz"), "c.tgz");
        assert_eq!(basename("c.tgz"), "c.tgz");
        assert_eq!(basename("a/b/"), "b");
    }
}
