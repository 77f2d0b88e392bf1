//! Remote subsetting against a local DAP2 server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use dataset_processor::{
    DatasetProcessor, FetchOutcome, HttpSettings, Processor, ProcessorContext, ProcessorVariant,
};
use storm_common::{ProcessorKind, ProcessorParams, StormError};
use test_utils::{assert_approx_eq, fixtures};

/// Canned responses keyed by file name and, for `.dods`, the raw query.
#[derive(Default)]
struct Dataset {
    dds: String,
    das: String,
    dods: HashMap<String, Vec<u8>>,
    /// Served for any `.dods` query when set.
    any_dods: Option<Vec<u8>>,
}

async fn serve_file(
    State(datasets): State<Arc<HashMap<String, Dataset>>>,
    Path(file): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let Some((name, suffix)) = file.rsplit_once('.') else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(dataset) = datasets.get(name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match suffix {
        "dds" => dataset.dds.clone().into_response(),
        "das" => dataset.das.clone().into_response(),
        "dods" => {
            let query = query.unwrap_or_default();
            match dataset.dods.get(&query).or(dataset.any_dods.as_ref()) {
                Some(body) => body.clone().into_response(),
                None => (StatusCode::BAD_REQUEST, format!("unexpected constraint {}", query))
                    .into_response(),
            }
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_server(datasets: HashMap<String, Dataset>) -> SocketAddr {
    let app = Router::new()
        .route("/dap/:file", get(serve_file))
        .with_state(Arc::new(datasets));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// XDR body writer for `.dods` payloads.
#[derive(Default)]
struct Xdr(Vec<u8>);

impl Xdr {
    fn f64_array(mut self, values: &[f64]) -> Self {
        self.length(values.len());
        for v in values {
            self.0.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    fn f32_array(mut self, values: &[f32]) -> Self {
        self.length(values.len());
        for v in values {
            self.0.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    fn length(&mut self, n: usize) {
        self.0.extend_from_slice(&(n as u32).to_be_bytes());
        self.0.extend_from_slice(&(n as u32).to_be_bytes());
    }

    fn row(mut self, time: f64, lat: f64, lon: f64, wspd: f32) -> Self {
        self.0.extend_from_slice(&[0x5A, 0, 0, 0]);
        self.0.extend_from_slice(&time.to_be_bytes());
        self.0.extend_from_slice(&lat.to_be_bytes());
        self.0.extend_from_slice(&lon.to_be_bytes());
        self.0.extend_from_slice(&wspd.to_be_bytes());
        self
    }

    fn end_sequence(mut self) -> Self {
        self.0.extend_from_slice(&[0xA5, 0, 0, 0]);
        self
    }

    fn dods(self, dds: &str) -> Vec<u8> {
        let mut body = dds.as_bytes().to_vec();
        body.extend_from_slice(b"\nData:\n");
        body.extend_from_slice(&self.0);
        body
    }
}

fn grid_dds(nt: usize, nlat: usize, nlon: usize) -> String {
    format!(
        "Dataset {{\n    Float64 time[time = {nt}];\n    Float64 latitude[latitude = {nlat}];\n    \
         Float64 longitude[longitude = {nlon}];\n    \
         Float32 wind_speed[time = {nt}][latitude = {nlat}][longitude = {nlon}];\n}} gulf_winds;"
    )
}

fn axes_dds(nt: usize, nlat: usize, nlon: usize) -> String {
    format!(
        "Dataset {{\n    Float64 time[time = {nt}];\n    Float64 latitude[latitude = {nlat}];\n    \
         Float64 longitude[longitude = {nlon}];\n}} gulf_winds;"
    )
}

const GRID_DAS: &str = r#"Attributes {
    time {
        String units "days since 2017-08-01 00:00:00";
    }
    wind_speed {
        String units "m s-1";
    }
    NC_GLOBAL {
        String title "Gulf winds";
    }
}"#;

const TIMES: [f64; 5] = [0.0, 10.0, 20.0, 30.0, 40.0];
const LONGITUDES: [f64; 5] = [260.0, 262.5, 265.0, 267.5, 270.0];

fn grid_dataset(latitudes: &[f64], subset: Option<(&str, Vec<u8>)>) -> Dataset {
    let axes = Xdr::default()
        .f64_array(&TIMES)
        .f64_array(latitudes)
        .f64_array(&LONGITUDES)
        .dods(&axes_dds(5, latitudes.len(), 5));

    let mut dods = HashMap::new();
    dods.insert("time,latitude,longitude".to_string(), axes);
    if let Some((constraint, body)) = subset {
        dods.insert(constraint.to_string(), body);
    }

    Dataset {
        dds: grid_dds(5, latitudes.len(), 5),
        das: GRID_DAS.to_string(),
        dods,
        any_dods: None,
    }
}

fn context(
    root: &std::path::Path,
    addr: SocketAddr,
    dataset: &str,
    kind: ProcessorKind,
) -> ProcessorContext {
    let storm = fixtures::storm();
    let requirement = fixtures::requirement(&storm, "Winds");
    let provider = fixtures::provider(&requirement, kind);
    ProcessorContext {
        url: format!("http://{}/dap/{}", addr, dataset),
        storm,
        requirement,
        provider,
        label: Some(dataset.to_string()),
        group: None,
        params: ProcessorParams::default(),
        settings: fixtures::archive_settings(root),
        http: HttpSettings::default(),
    }
}

#[tokio::test]
async fn test_grid_subset_is_written_with_raw_units() {
    // Aug 20 .. Sep 3 is 19 .. 33 days since Aug 1, so times 20 and 30 remain.
    let constraint = "time[2:1:3],latitude[1:1:3],longitude[1:1:3],wind_speed[2:1:3][1:1:3][1:1:3]";
    let wind: Vec<f32> = (0..18).map(|i| i as f32).collect();
    let subset = Xdr::default()
        .f64_array(&[20.0, 30.0])
        .f64_array(&[29.0, 31.0, 33.0])
        .f64_array(&[262.5, 265.0, 267.5])
        .f32_array(&wind)
        .dods(&grid_dds(2, 3, 3));

    let mut datasets = HashMap::new();
    datasets.insert(
        "winds".to_string(),
        grid_dataset(&[27.0, 29.0, 31.0, 33.0, 35.0], Some((constraint, subset))),
    );
    let addr = spawn_server(datasets).await;
    let root = tempfile::tempdir().unwrap();

    let mut processor = Processor::open(context(root.path(), addr, "winds", ProcessorKind::RemoteGrid))
        .await
        .unwrap();
    assert_eq!(processor.variant(), ProcessorVariant::RemoteGrid);

    let outcome = processor.fetch().await.unwrap();
    let path = match outcome {
        FetchOutcome::Written { path } => path,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert!(path.ends_with("incomplete/Harvey/Winds/provider-1/winds.nc"));
    assert!(processor.summary().success);

    let file = netcdf::open(&path).unwrap();
    let time = file.variable("time").unwrap();
    let times: Vec<f64> = time.get_values(..).unwrap();
    assert_eq!(times, vec![20.0, 30.0]);
    match time.attribute_value("units").unwrap().unwrap() {
        netcdf::AttributeValue::Str(s) => assert_eq!(s, "days since 2017-08-01 00:00:00"),
        other => panic!("unexpected units {:?}", other),
    }

    let lons: Vec<f64> = file.variable("longitude").unwrap().get_values(..).unwrap();
    assert_eq!(lons, vec![262.5, 265.0, 267.5]);
    let values: Vec<f32> = file.variable("wind_speed").unwrap().get_values(..).unwrap();
    assert_eq!(values, wind);
}

#[tokio::test]
async fn test_grid_outside_extent_is_skipped() {
    let mut datasets = HashMap::new();
    datasets.insert(
        "arctic".to_string(),
        grid_dataset(&[60.0, 61.0, 62.0, 63.0, 64.0], None),
    );
    let addr = spawn_server(datasets).await;
    let root = tempfile::tempdir().unwrap();

    let mut processor = Processor::open(context(root.path(), addr, "arctic", ProcessorKind::RemoteGrid))
        .await
        .unwrap();
    let outcome = tokio_test::assert_ok!(processor.fetch().await);

    assert!(matches!(outcome, FetchOutcome::Skipped { .. }));
    assert!(!processor.summary().output_path.exists());
    assert!(processor.summary().success);
}

#[tokio::test]
async fn test_missing_axes_fail_as_configuration() {
    let mut datasets = HashMap::new();
    datasets.insert(
        "model".to_string(),
        Dataset {
            dds: "Dataset {\n    Float64 time[time = 2];\n    Float64 lat[lat = 2];\n    \
                  Float64 lon[lon = 2];\n} model;"
                .to_string(),
            das: "Attributes {\n}".to_string(),
            ..Dataset::default()
        },
    );
    let addr = spawn_server(datasets).await;
    let root = tempfile::tempdir().unwrap();

    let err = Processor::open(context(root.path(), addr, "model", ProcessorKind::RemoteGrid))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, StormError::Configuration(_)));
}

#[tokio::test]
async fn test_sequence_rows_are_written_along_obs() {
    let dds = "Dataset {\n    Sequence {\n        Float64 time;\n        Float64 latitude;\n        \
               Float64 longitude;\n        Float32 wspd;\n    } buoys;\n} ndbc;";
    let body = Xdr::default()
        .row(1_503_360_000.0, 28.5, 265.0, 12.5)
        .row(1_503_446_400.0, 29.0, 266.0, 14.0)
        .end_sequence()
        .dods(dds);

    let mut datasets = HashMap::new();
    datasets.insert(
        "buoys".to_string(),
        Dataset {
            dds: dds.to_string(),
            das: "Attributes {\n}".to_string(),
            dods: HashMap::new(),
            any_dods: Some(body),
        },
    );
    let addr = spawn_server(datasets).await;
    let root = tempfile::tempdir().unwrap();

    let mut processor = Processor::open(context(root.path(), addr, "buoys", ProcessorKind::RemoteSequence))
        .await
        .unwrap();
    let path = processor.fetch().await.unwrap().path().cloned().unwrap();

    let file = netcdf::open(&path).unwrap();
    assert_eq!(file.dimension("obs").unwrap().len(), 2);
    let wspd: Vec<f32> = file.variable("wspd").unwrap().get_values(..).unwrap();
    assert_eq!(wspd.len(), 2);
    assert_approx_eq!(wspd[0], 12.5, 1e-6);
    assert_approx_eq!(wspd[1], 14.0, 1e-6);
}
