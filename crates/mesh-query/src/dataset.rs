//! Point time series from unstructured mesh output (UGRID face data).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use storm_common::CfTimeUnits;

use crate::error::{MeshQueryError, MeshQueryResult};
use crate::kdtree::KdTree;

pub const FACE_Y: &str = "mesh2d_face_y";
pub const FACE_X: &str = "mesh2d_face_x";
pub const TIME: &str = "time";
pub const WATER_DEPTH: &str = "mesh2d_waterdepth";

/// One time step at the queried node. `value` is `None` for fill values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// An opened mesh dataset with its node index built.
pub struct MeshDataset {
    path: PathBuf,
    file: netcdf::File,
    tree: KdTree,
    times: Vec<DateTime<Utc>>,
}

impl std::fmt::Debug for MeshDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshDataset")
            .field("path", &self.path)
            .field("nodes", &self.tree.len())
            .field("times", &self.times.len())
            .finish()
    }
}

impl MeshDataset {
    /// Open the dataset and index its face coordinates.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> MeshQueryResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MeshQueryError::DatasetNotFound(path.display().to_string()));
        }

        dataset_processor::silence_hdf5_errors();
        let file = netcdf::open(path)?;

        let ys = read_f64(&file, FACE_Y)?;
        let xs = read_f64(&file, FACE_X)?;
        if ys.len() != xs.len() {
            return Err(MeshQueryError::MissingData(format!(
                "{} has {} nodes but {} has {}",
                FACE_Y,
                ys.len(),
                FACE_X,
                xs.len()
            )));
        }
        let tree = KdTree::new(&ys, &xs);
        let times = read_times(&file)?;

        debug!(nodes = tree.len(), times = times.len(), "Indexed mesh");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            tree,
            times,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Nearest face to `(lat, lon)`.
    pub fn nearest_node(&self, lat: f64, lon: f64) -> Option<usize> {
        self.tree.nearest(lat, lon)
    }

    /// Water depth at the face nearest `(lat, lon)` for every time step, in
    /// the dataset's own time order.
    pub fn point_series(&self, lat: f64, lon: f64) -> MeshQueryResult<Vec<PointSample>> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(MeshQueryError::InvalidCoordinate(format!("({}, {})", lat, lon)));
        }
        let node = self.nearest_node(lat, lon).ok_or(MeshQueryError::NoNode)?;
        self.series_at(node)
    }

    fn series_at(&self, node: usize) -> MeshQueryResult<Vec<PointSample>> {
        let var = self
            .file
            .variable(WATER_DEPTH)
            .ok_or_else(|| MeshQueryError::MissingData(format!("{} variable", WATER_DEPTH)))?;

        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        if dims.len() != 2 {
            return Err(MeshQueryError::MissingData(format!(
                "{} should have 2 dimensions, has {:?}",
                WATER_DEPTH, dims
            )));
        }
        let time_first = dims[0] == TIME;
        let fill = fill_value(&var);

        self.times
            .iter()
            .enumerate()
            .map(|(t, &timestamp)| {
                let index = if time_first { [t, node] } else { [node, t] };
                let raw: f64 = var.get_value(index)?;
                let value = Some(raw).filter(|v| v.is_finite() && Some(*v) != fill);
                Ok(PointSample { timestamp, value })
            })
            .collect()
    }
}

fn read_f64(file: &netcdf::File, name: &str) -> MeshQueryResult<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| MeshQueryError::MissingData(format!("{} variable", name)))?;
    Ok(var.get_values(..)?)
}

/// Time axis decoded through its CF units; epoch seconds when it has none.
fn read_times(file: &netcdf::File) -> MeshQueryResult<Vec<DateTime<Utc>>> {
    let var = file
        .variable(TIME)
        .ok_or_else(|| MeshQueryError::MissingData(format!("{} variable", TIME)))?;
    let raw: Vec<f64> = var.get_values(..)?;

    let units = var
        .attributes()
        .find(|a| a.name() == "units")
        .and_then(|a| a.value().ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Str(s) => CfTimeUnits::parse(&s),
            _ => None,
        });

    raw.into_iter()
        .map(|v| {
            let decoded = match &units {
                Some(units) => units.decode(v),
                None => DateTime::from_timestamp(v as i64, 0),
            };
            decoded.ok_or_else(|| MeshQueryError::MissingData(format!("undecodable time {}", v)))
        })
        .collect()
}

fn fill_value(var: &netcdf::Variable) -> Option<f64> {
    var.attributes()
        .find(|a| a.name() == "_FillValue")
        .and_then(|a| a.value().ok())
        .and_then(|v| f64::try_from(v).ok())
}
