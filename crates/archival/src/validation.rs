//! Checks applied to a model-output upload before anything is mutated.

use storage::Storage;
use storm_common::{ArchiveSettings, ModelRun, StoragePath, StormError, StormResult};

/// Validate an uploaded model-output path for `run`.
///
/// The run must not be extracted yet, `submitted` must equal the canonical
/// upload path (storage-relative or in the backend's absolute form) and the
/// object must exist. Returns the storage-relative path.
pub async fn validate_model_output(
    settings: &ArchiveSettings,
    storage: &dyn Storage,
    storm: &str,
    run: &ModelRun,
    submitted: &str,
) -> StormResult<String> {
    if run.model_output_snapshot_extracted {
        return Err(StormError::Validation(
            "Cannot be updated since the model output has already been processed".to_string(),
        ));
    }

    let expected = StoragePath::model_output_upload(settings, storm, run);
    if submitted != expected && submitted != storage.path(&expected) {
        return Err(StormError::Validation(format!(
            "'model_output_snapshot' should equal '{}'",
            expected
        )));
    }

    if !storage.exists(&expected).await? {
        return Err(StormError::Validation(format!(
            "{} does not exist in storage",
            expected
        )));
    }

    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::{LocalStorage, LocalStorageConfig};
    use test_utils::fixtures;

    async fn stage_upload(storage: &dyn Storage, path: &str) {
        storage.write(path, b"tgz".to_vec().into()).await.unwrap();
    }

    fn local(root: &std::path::Path) -> LocalStorage {
        LocalStorage::new(&LocalStorageConfig {
            root: root.to_path_buf(),
            media_url: "/media/".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_canonical_existing_upload_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local(dir.path());
        let settings = ArchiveSettings::default();
        let run = fixtures::model_run(68, &fixtures::storm());

        stage_upload(&storage, "Harvey/upload/v68.tgz").await;
        let path = validate_model_output(&settings, &storage, "Harvey", &run, "Harvey/upload/v68.tgz")
            .await
            .unwrap();
        assert_eq!(path, "Harvey/upload/v68.tgz");

        let absolute = storage.path("Harvey/upload/v68.tgz");
        assert!(validate_model_output(&settings, &storage, "Harvey", &run, &absolute)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_wrong_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local(dir.path());
        let run = fixtures::model_run(68, &fixtures::storm());

        stage_upload(&storage, "Harvey/upload/v67.tgz").await;
        let err = validate_model_output(
            &ArchiveSettings::default(),
            &storage,
            "Harvey",
            &run,
            "Harvey/upload/v67.tgz",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StormError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local(dir.path());
        let run = fixtures::model_run(68, &fixtures::storm());

        let err = validate_model_output(
            &ArchiveSettings::default(),
            &storage,
            "Harvey",
            &run,
            "Harvey/upload/v68.tgz",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_extracted_run_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local(dir.path());
        let mut run = fixtures::model_run(68, &fixtures::storm());
        run.model_output_snapshot_extracted = true;

        stage_upload(&storage, "Harvey/upload/v68.tgz").await;
        let err = validate_model_output(
            &ArchiveSettings::default(),
            &storage,
            "Harvey",
            &run,
            "Harvey/upload/v68.tgz",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("already been processed"));
    }
}
