//! Error types for mesh point queries.

use thiserror::Error;

use storm_common::StormError;

pub type MeshQueryResult<T> = Result<T, MeshQueryError>;

#[derive(Error, Debug)]
pub enum MeshQueryError {
    #[error("Dataset path does not exist: {0}")]
    DatasetNotFound(String),

    /// Missing mesh variable or dimension
    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("No data found at this location")]
    NoNode,

    #[error("NetCDF error: {0}")]
    NetCdf(String),
}

impl From<netcdf::Error> for MeshQueryError {
    fn from(err: netcdf::Error) -> Self {
        MeshQueryError::NetCdf(err.to_string())
    }
}

impl From<MeshQueryError> for StormError {
    fn from(err: MeshQueryError) -> Self {
        match err {
            MeshQueryError::DatasetNotFound(_) | MeshQueryError::NoNode => {
                StormError::NotFound(err.to_string())
            }
            MeshQueryError::InvalidCoordinate(_) => StormError::Configuration(err.to_string()),
            MeshQueryError::MissingData(_) | MeshQueryError::NetCdf(_) => {
                StormError::DataFormat(err.to_string())
            }
        }
    }
}
