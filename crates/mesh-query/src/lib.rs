//! Nearest-node point queries against unstructured mesh model output.
//!
//! A [`MeshDataset`] indexes the mesh's face coordinates in a [`KdTree`]
//! once, then answers `(lat, lon)` queries with the full time series of the
//! nearest face.

pub mod dataset;
pub mod error;
pub mod kdtree;

pub use dataset::{MeshDataset, PointSample};
pub use error::{MeshQueryError, MeshQueryResult};
pub use kdtree::KdTree;
