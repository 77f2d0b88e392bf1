//! Point query handler.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Extension, RawQuery},
    Json,
};
use serde::Serialize;
use tracing::{debug, instrument};

use mesh_query::{MeshDataset, MeshQueryError, PointSample};
use storm_common::StormError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Parsed `/psa-filter` query string. `coordinate` repeats, so the
/// serde-backed `Query` extractor can't collect it.
#[derive(Debug, Default, PartialEq)]
pub struct PsaFilterParams {
    pub dataset_path: String,
    pub coordinate: Vec<String>,
}

impl PsaFilterParams {
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "dataset_path" => params.dataset_path = value.into_owned(),
                "coordinate" => params.coordinate.push(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// `(lat, lon)` from exactly two numeric coordinate values.
    pub fn point(&self) -> ApiResult<(f64, f64)> {
        if self.coordinate.len() != 2 {
            return Err(ApiError::NotFound("Coordinate (2) not supplied".to_string()));
        }
        let parsed: Result<Vec<f64>, _> =
            self.coordinate.iter().map(|c| c.trim().parse::<f64>()).collect();
        match parsed.as_deref() {
            Ok([lat, lon]) if lat.is_finite() && lon.is_finite() => Ok((*lat, *lon)),
            _ => Err(ApiError::NotFound("Coordinate should be floats".to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PsaFilterResponse {
    pub water_depth: Vec<PointSample>,
}

/// Join a client-supplied dataset path under `root`, refusing anything that
/// could step outside it.
fn resolve_dataset(root: &Path, dataset_path: &str) -> Option<PathBuf> {
    let relative = Path::new(dataset_path);
    if dataset_path.is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    let absolute = root.join(relative);
    absolute.is_file().then_some(absolute)
}

/// GET /psa-filter?dataset_path=..&coordinate=<lat>&coordinate=<lon>
#[instrument(skip_all)]
pub async fn psa_filter_handler(
    Extension(state): Extension<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> ApiResult<Json<PsaFilterResponse>> {
    let params = PsaFilterParams::parse(query.as_deref().unwrap_or_default());

    let root = state.opendap_root();
    let Some(path) = resolve_dataset(&root, &params.dataset_path) else {
        return Err(ApiError::NotFound(format!(
            "Dataset Path does not exist: {}",
            root.join(&params.dataset_path).display()
        )));
    };
    let (lat, lon) = params.point()?;

    debug!(path = %path.display(), lat, lon, "Point query");
    let water_depth = tokio::task::spawn_blocking(move || {
        MeshDataset::open(&path)?.point_series(lat, lon)
    })
    .await
    .map_err(|e| StormError::Internal(format!("Point query task failed: {}", e)))?
    .map_err(|e| match e {
        MeshQueryError::NoNode => ApiError::NotFound("No data found at this location".to_string()),
        other => ApiError::Storm(other.into()),
    })?;

    metrics::counter!("psa_point_queries_total").increment(1);
    Ok(Json(PsaFilterResponse { water_depth }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collects_repeated_coordinates() {
        let params =
            PsaFilterParams::parse("dataset_path=Harvey%2Fmesh.nc&coordinate=29.6&coordinate=-94.4");
        assert_eq!(params.dataset_path, "Harvey/mesh.nc");
        assert_eq!(params.coordinate, vec!["29.6", "-94.4"]);
        assert_eq!(params.point().unwrap(), (29.6, -94.4));
    }

    #[test]
    fn test_point_requires_two_floats() {
        let one = PsaFilterParams::parse("coordinate=29.6");
        assert!(matches!(one.point(), Err(ApiError::NotFound(_))));

        let three = PsaFilterParams::parse("coordinate=1&coordinate=2&coordinate=3");
        assert!(matches!(three.point(), Err(ApiError::NotFound(_))));

        let words = PsaFilterParams::parse("coordinate=north&coordinate=-94.4");
        assert!(matches!(words.point(), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_resolve_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mesh.nc"), b"nc").unwrap();

        assert!(resolve_dataset(dir.path(), "mesh.nc").is_some());
        assert!(resolve_dataset(dir.path(), "").is_none());
        assert!(resolve_dataset(dir.path(), "../mesh.nc").is_none());
        assert!(resolve_dataset(dir.path(), "/etc/passwd").is_none());
        assert!(resolve_dataset(dir.path(), "missing.nc").is_none());
    }
}
