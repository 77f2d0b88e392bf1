//! Whole-file and container downloads against a local HTTP provider.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;

use dataset_processor::{
    ContainerFilter, DatasetProcessor, FetchOutcome, HttpSettings, Processor, ProcessorContext,
    ProcessorResult, ProcessorVariant,
};
use storm_common::{ProcessorKind, ProcessorParams};
use test_utils::fixtures;

const PAYLOAD: &[u8] = b"#YY MM DD hh mm WDIR WSPD\n2017 08 25 00 00 120 14.2\n";

/// Small NetCDF file with a three-step time axis.
fn container_bytes(dir: &Path) -> Vec<u8> {
    let path = dir.join("source.nc");
    {
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("time", 3).unwrap();
        let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
        time.put_values(&[0.0, 3600.0, 7200.0], ..).unwrap();
    }
    std::fs::read(&path).unwrap()
}

async fn spawn_provider(container: Vec<u8>) -> SocketAddr {
    let app = Router::new()
        .route("/buoys/42001", get(|| async { PAYLOAD.to_vec() }))
        .route("/winds.nc", get(move || async move { container.clone() }))
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down") }),
        )
        .route(
            "/truncated",
            get(|| async {
                let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                    Ok(Bytes::from_static(PAYLOAD)),
                    Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection lost")),
                ];
                Body::from_stream(futures::stream::iter(chunks))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn context(root: &Path, url: String, kind: ProcessorKind) -> ProcessorContext {
    let storm = fixtures::storm();
    let requirement = fixtures::requirement(&storm, "Winds");
    let provider = fixtures::provider(&requirement, kind);
    ProcessorContext {
        url,
        storm,
        requirement,
        provider,
        label: Some("42001".to_string()),
        group: None,
        params: ProcessorParams::default(),
        settings: fixtures::archive_settings(root),
        http: HttpSettings::default(),
    }
}

/// Every entry left in the provider's staging directory.
fn staged_entries(root: &Path) -> Vec<String> {
    let dir = root.join("incomplete/Harvey/Winds/provider-1");
    match std::fs::read_dir(&dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_raw_download_is_placed_world_readable() {
    let scratch = tempfile::tempdir().unwrap();
    let addr = spawn_provider(container_bytes(scratch.path())).await;
    let root = tempfile::tempdir().unwrap();

    let url = format!("http://{}/buoys/42001", addr);
    let mut processor = Processor::open(context(root.path(), url, ProcessorKind::RawBinary))
        .await
        .unwrap();
    assert_eq!(processor.variant(), ProcessorVariant::RawFile);

    let path = match processor.fetch().await.unwrap() {
        FetchOutcome::Written { path } => path,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(path, root.path().join("incomplete/Harvey/Winds/provider-1/42001"));
    assert_eq!(std::fs::read(&path).unwrap(), PAYLOAD);
    assert_eq!(staged_entries(root.path()), vec!["42001".to_string()]);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}

#[tokio::test]
async fn test_failed_download_leaves_no_partial_file() {
    let scratch = tempfile::tempdir().unwrap();
    let addr = spawn_provider(container_bytes(scratch.path())).await;

    for route in ["broken", "truncated"] {
        let root = tempfile::tempdir().unwrap();
        let url = format!("http://{}/{}", addr, route);
        let mut processor = Processor::open(context(root.path(), url, ProcessorKind::RawBinary))
            .await
            .unwrap();

        assert!(processor.fetch().await.is_err(), "{} should fail", route);
        assert!(!processor.summary().success);
        assert!(!root.path().join("incomplete/Harvey/Winds/provider-1/42001").exists());
        assert!(staged_entries(root.path()).is_empty(), "{}: {:?}", route, staged_entries(root.path()));
    }
}

/// Counts its invocations and tags the file it was given.
struct TaggingFilter {
    calls: Arc<AtomicUsize>,
}

impl ContainerFilter for TaggingFilter {
    fn filter(&self, file: &mut netcdf::FileMut) -> ProcessorResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(file.variable("time").is_some());
        file.add_attribute("subset", "Harvey window")?;
        Ok(())
    }
}

#[tokio::test]
async fn test_container_filter_runs_on_reopened_file() {
    let scratch = tempfile::tempdir().unwrap();
    let addr = spawn_provider(container_bytes(scratch.path())).await;
    let root = tempfile::tempdir().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let filter = Arc::new(TaggingFilter { calls: Arc::clone(&calls) });
    let url = format!("http://{}/winds.nc", addr);
    let mut processor = Processor::open_with(
        context(root.path(), url, ProcessorKind::HierarchicalContainer),
        filter,
    )
    .await
    .unwrap();
    assert_eq!(processor.variant(), ProcessorVariant::Container);

    let path = match processor.fetch().await.unwrap() {
        FetchOutcome::Written { path } => path,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(processor.summary().success);

    let file = netcdf::open(&path).unwrap();
    match file.attribute("subset").unwrap().value().unwrap() {
        netcdf::AttributeValue::Str(s) => assert_eq!(s, "Harvey window"),
        other => panic!("unexpected attribute {:?}", other),
    }
    let times: Vec<f64> = file.variable("time").unwrap().get_values(..).unwrap();
    assert_eq!(times, vec![0.0, 3600.0, 7200.0]);
}
