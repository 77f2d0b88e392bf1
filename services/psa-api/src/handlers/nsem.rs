//! Model run ("NSEM") handlers.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use url::Url;

use storm_common::{ModelRun, StoragePath};

use crate::error::ApiResult;
use crate::state::AppState;

/// A model run with the derived locations clients need.
#[derive(Debug, Serialize)]
pub struct ModelRunResponse {
    #[serde(flatten)]
    pub run: ModelRun,
    /// Where the model operator must upload output, in the backend's form.
    pub model_output_upload_path: String,
    pub covered_data_storage_url: Option<String>,
    /// THREDDS catalog of the extracted output; set once extracted.
    pub thredds_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelOutputRequest {
    pub model_output_snapshot: String,
}

#[derive(Debug, Serialize)]
pub struct CombineQueuedResponse {
    pub run_id: i64,
    pub task_id: String,
}

/// `{scheme}://{host}/thredds/catalog/cwwed/{storm}/v{run}/{psa_dir}/catalog.html`
pub fn thredds_catalog_url(
    scheme: &str,
    host: &str,
    storm: &str,
    run: &ModelRun,
    psa_dir: &str,
) -> Option<String> {
    let version = run.version();
    let mut url = Url::parse(&format!("{}://{}/", scheme, host)).ok()?;
    url.path_segments_mut().ok()?.pop_if_empty().extend([
        "thredds",
        "catalog",
        "cwwed",
        storm,
        version.as_str(),
        psa_dir,
        "catalog.html",
    ]);
    Some(url.to_string())
}

/// Request scheme and host, honouring a fronting proxy.
fn request_origin(headers: &HeaderMap) -> (String, String) {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let scheme = value("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    let host = value("x-forwarded-host")
        .or_else(|| value(header::HOST.as_str()))
        .unwrap_or_else(|| "localhost".to_string());
    (scheme, host)
}

async fn describe(
    state: &AppState,
    run: ModelRun,
    headers: &HeaderMap,
) -> ApiResult<ModelRunResponse> {
    let archiver = &state.archiver;
    let settings = archiver.settings();
    let storm = archiver.records().storm(run.storm_id).await?;
    let storage = archiver.storage();

    let upload = StoragePath::model_output_upload(settings, &storm.name, &run);
    let covered_data_storage_url = (!run.covered_data_snapshot.is_empty())
        .then(|| storage.storage_url(&run.covered_data_snapshot));
    let thredds_url = if run.model_output_snapshot_extracted {
        let (scheme, host) = request_origin(headers);
        thredds_catalog_url(&scheme, &host, &storm.name, &run, &settings.psa_dir)
    } else {
        None
    };

    Ok(ModelRunResponse {
        model_output_upload_path: storage.path(&upload),
        covered_data_storage_url,
        thredds_url,
        run,
    })
}

/// GET /nsem/:id
pub async fn get_model_run_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<Json<ModelRunResponse>> {
    let run = state.archiver.records().model_run(id).await?;
    Ok(Json(describe(&state, run, &headers).await?))
}

/// PATCH /nsem/:id/model-output
///
/// Validates the uploaded path, records it and schedules extraction.
#[instrument(skip_all)]
pub async fn submit_model_output_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<ModelOutputRequest>,
) -> ApiResult<Json<ModelRunResponse>> {
    let run = state
        .archiver
        .submit_model_output(id, &body.model_output_snapshot)
        .await?;
    info!(run = run.id, "Model output accepted, extraction queued");
    Ok(Json(describe(&state, run, &headers).await?))
}

/// POST /nsem/:id/covered-data
pub async fn request_covered_data_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<CombineQueuedResponse>)> {
    let task_id = state.archiver.request_combine(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CombineQueuedResponse { run_id: id, task_id }),
    ))
}
