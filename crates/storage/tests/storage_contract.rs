//! Both storage backends must behave identically for the archival stages.

use std::sync::Arc;

use bytes::Bytes;
use object_store::memory::InMemory;
use storage::{LocalStorage, LocalStorageConfig, ObjectStorage, Storage};
use storm_common::StormError;

fn backends(dir: &tempfile::TempDir) -> Vec<(&'static str, Arc<dyn Storage>)> {
    let local = LocalStorage::new(&LocalStorageConfig {
        root: dir.path().join("store"),
        media_url: "/media/".to_string(),
    })
    .unwrap();
    let object = ObjectStorage::with_store(Arc::new(InMemory::new()), "archives");
    vec![("local", Arc::new(local)), ("object", Arc::new(object))]
}

#[tokio::test]
async fn copy_then_delete_source_moves_object() {
    let dir = tempfile::tempdir().unwrap();
    for (name, storage) in backends(&dir) {
        storage
            .write("Harvey/upload/v2.tgz", Bytes::from_static(b"model output"))
            .await
            .unwrap();

        storage
            .copy_within_storage("Harvey/upload/v2.tgz", "Harvey/v2/psa.tgz")
            .await
            .unwrap();
        tokio_test::assert_ok!(storage.delete("Harvey/upload/v2.tgz").await);

        assert!(!storage.exists("Harvey/upload/v2.tgz").await.unwrap(), "{}", name);
        assert_eq!(
            storage.read("Harvey/v2/psa.tgz").await.unwrap(),
            Bytes::from_static(b"model output"),
            "{}",
            name
        );
    }
}

#[tokio::test]
async fn missing_objects_report_not_found() {
    let dir = tempfile::tempdir().unwrap();
    for (name, storage) in backends(&dir) {
        let err = storage.read("nope.tgz").await.unwrap_err();
        assert!(matches!(err, StormError::NotFound(_)), "{}: {:?}", name, err);
        assert!(!storage.exists("nope.tgz").await.unwrap(), "{}", name);
    }
}

#[tokio::test]
async fn archive_upload_round_trips_through_local_files() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("Winds-2017-08-30.tgz");
    std::fs::write(&archive, vec![7u8; 64 * 1024]).unwrap();

    for (name, storage) in backends(&dir) {
        let key = "covered-data-archive/Harvey/Winds-2017-08-30.tgz";
        storage.put_file(&archive, key).await.unwrap();

        let back = dir.path().join(name).join("download.tgz");
        let size = storage.get_file(key, &back).await.unwrap();
        assert_eq!(size, 64 * 1024, "{}", name);
        assert_eq!(std::fs::read(&back).unwrap(), vec![7u8; 64 * 1024]);
    }
}
