//! Router tests against local storage, in-memory records and queue.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use archival::Archiver;
use psa_api::state::AppState;
use storage::{LocalStorage, LocalStorageConfig, MemoryRecordStore, MemoryTaskQueue, Storage};
use storm_common::TaskMessage;
use test_utils::fixtures;
use test_utils::generators::mesh_lattice;

struct Harness {
    dir: tempfile::TempDir,
    app: Router,
    records: Arc<MemoryRecordStore>,
    queue: Arc<MemoryTaskQueue>,
    storage: Arc<dyn Storage>,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(&LocalStorageConfig {
            root: dir.path().join("storage"),
            media_url: "/media/".to_string(),
        })
        .unwrap(),
    );

    let records = Arc::new(MemoryRecordStore::new());
    let storm = fixtures::storm();
    records.add_storm(storm.clone()).await;
    records.add_model_run(fixtures::model_run(68, &storm)).await;

    let queue = Arc::new(MemoryTaskQueue::new());
    let archiver = Arc::new(Archiver::new(
        Arc::clone(&storage),
        records.clone(),
        queue.clone(),
        fixtures::archive_settings(&dir.path().join("data")),
    ));
    let app = psa_api::router(Arc::new(AppState::new(archiver)));

    Harness {
        dir,
        app,
        records,
        queue,
        storage,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "cwwed.example.org")
        .body(Body::empty())
        .unwrap()
}

fn patch_output(id: i64, path: &str) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(format!("/nsem/{}/model-output", id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "model_output_snapshot": path }).to_string(),
        ))
        .unwrap()
}

/// 4 x 3 lattice, two hourly steps; depth = step * 100 + node.
fn write_mesh(path: &Path) {
    let (ys, xs) = mesh_lattice(-95.0, 29.0, 0.5, 4, 3);
    let nodes = ys.len();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();

    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("nmesh2d_face", nodes).unwrap();
    file.add_dimension("time", 2).unwrap();

    let mut y = file.add_variable::<f64>("mesh2d_face_y", &["nmesh2d_face"]).unwrap();
    y.put_values(&ys, ..).unwrap();
    let mut x = file.add_variable::<f64>("mesh2d_face_x", &["nmesh2d_face"]).unwrap();
    x.put_values(&xs, ..).unwrap();

    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_values(&[0.0, 3600.0], ..).unwrap();
    time.put_attribute("units", "seconds since 2017-08-25 00:00:00").unwrap();

    let depth: Vec<f64> = (0..2)
        .flat_map(|t| (0..nodes).map(move |n| (t * 100 + n) as f64))
        .collect();
    let mut var = file
        .add_variable::<f64>("mesh2d_waterdepth", &["time", "nmesh2d_face"])
        .unwrap();
    var.put_values(&depth, ..).unwrap();
}

#[tokio::test]
async fn test_health() {
    let h = harness().await;
    let (status, body) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_model_run_exposes_upload_path() {
    let h = harness().await;
    let (status, body) = send(&h.app, get("/nsem/68")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 68);
    assert_eq!(
        body["model_output_upload_path"],
        h.storage.path("Harvey/upload/v68.tgz")
    );
    assert_eq!(body["covered_data_storage_url"], Value::Null);
    assert_eq!(body["thredds_url"], Value::Null);
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let h = harness().await;
    let (status, _) = send(&h.app, get("/nsem/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_must_use_canonical_path() {
    let h = harness().await;
    let (status, body) = send(&h.app, patch_output(68, "Harvey/upload/latest.tgz")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["detail"],
        "'model_output_snapshot' should equal 'Harvey/upload/v68.tgz'"
    );
    assert!(h.queue.queued().await.is_empty());
}

#[tokio::test]
async fn test_upload_must_exist_in_storage() {
    let h = harness().await;
    let (status, body) = send(&h.app, patch_output(68, "Harvey/upload/v68.tgz")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Harvey/upload/v68.tgz does not exist in storage");
}

#[tokio::test]
async fn test_accepted_upload_queues_extraction() {
    let h = harness().await;
    tokio_test::assert_ok!(
        h.storage
            .write("Harvey/upload/v68.tgz", b"tgz".to_vec().into())
            .await
    );

    // The backend's absolute form is accepted too.
    let absolute = h.storage.path("Harvey/upload/v68.tgz");
    let (status, body) = send(&h.app, patch_output(68, &absolute)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_output_snapshot"], "Harvey/upload/v68.tgz");
    assert_eq!(
        h.queue.queued().await,
        vec![TaskMessage::Extract { run_id: 68 }]
    );
}

#[tokio::test]
async fn test_extracted_run_rejects_upload_and_links_catalog() {
    let h = harness().await;
    let storm = fixtures::storm();
    let mut run = fixtures::model_run(68, &storm);
    run.model_output_snapshot = "Harvey/v68/psa/v68.tgz".to_string();
    run.model_output_snapshot_extracted = true;
    run.covered_data_snapshot = "Harvey/v68/covered-data".to_string();
    h.records.add_model_run(run).await;

    let (status, body) = send(&h.app, patch_output(68, "Harvey/upload/v68.tgz")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["detail"],
        "Cannot be updated since the model output has already been processed"
    );

    let (status, body) = send(&h.app, get("/nsem/68")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["thredds_url"],
        "http://cwwed.example.org/thredds/catalog/cwwed/Harvey/v68/psa/catalog.html"
    );
    assert_eq!(body["covered_data_storage_url"], "/media/Harvey/v68/covered-data");
}

#[tokio::test]
async fn test_covered_data_request_queues_combine() {
    let h = harness().await;
    let request = Request::builder()
        .method("POST")
        .uri("/nsem/68/covered-data")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["run_id"], 68);
    assert_eq!(h.queue.queued().await, vec![TaskMessage::Combine { run_id: 68 }]);
}

#[tokio::test]
async fn test_point_query_returns_series_at_nearest_face() {
    let h = harness().await;
    write_mesh(&h.dir.path().join("data/opendap/Harvey/mesh.nc"));

    let (status, body) = send(
        &h.app,
        get("/psa-filter?dataset_path=Harvey/mesh.nc&coordinate=29.6&coordinate=-94.4"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let series = body["water_depth"].as_array().unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0]["value"], 5.0);
    assert_eq!(series[1]["value"], 105.0);
    assert_eq!(series[1]["timestamp"], "2017-08-25T01:00:00Z");
}

#[tokio::test]
async fn test_point_query_rejections_are_not_found() {
    let h = harness().await;
    write_mesh(&h.dir.path().join("data/opendap/Harvey/mesh.nc"));

    for uri in [
        "/psa-filter?dataset_path=Harvey/missing.nc&coordinate=29.6&coordinate=-94.4",
        "/psa-filter?dataset_path=Harvey/mesh.nc&coordinate=29.6",
        "/psa-filter?dataset_path=Harvey/mesh.nc&coordinate=north&coordinate=-94.4",
        "/psa-filter?coordinate=29.6&coordinate=-94.4",
    ] {
        let (status, body) = send(&h.app, get(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert!(body["detail"].is_string());
    }
}
