//! Error types for dataset processors.

use thiserror::Error;

use storm_common::StormError;

/// Result type for processor operations.
pub type ProcessorResult<T> = Result<T, ProcessorError>;

#[derive(Error, Debug)]
pub enum ProcessorError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failure talking to a provider
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote dataset lacks the axes needed for subsetting
    #[error("Dataset {url} is missing expected dimensions: {missing:?}")]
    MissingDimensions { url: String, missing: Vec<String> },

    /// Bad record layout or processor parameters
    #[error("Invalid processor parameters: {0}")]
    InvalidParams(String),

    /// Malformed DDS/DAS/DODS payload
    #[error("Malformed DAP response: {0}")]
    Dap(String),

    /// NetCDF library failure
    #[error("NetCDF error: {0}")]
    NetCdf(String),

    #[error(transparent)]
    Storm(#[from] StormError),
}

impl From<netcdf::Error> for ProcessorError {
    fn from(err: netcdf::Error) -> Self {
        ProcessorError::NetCdf(err.to_string())
    }
}

impl From<tempfile::PersistError> for ProcessorError {
    fn from(err: tempfile::PersistError) -> Self {
        ProcessorError::Io(err.error)
    }
}

impl From<tempfile::PathPersistError> for ProcessorError {
    fn from(err: tempfile::PathPersistError) -> Self {
        ProcessorError::Io(err.error)
    }
}

impl From<tokio::task::JoinError> for ProcessorError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProcessorError::Storm(StormError::Internal(format!("Task join error: {}", err)))
    }
}

impl From<ProcessorError> for StormError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::MissingDimensions { .. } | ProcessorError::InvalidParams(_) => {
                StormError::Configuration(err.to_string())
            }
            ProcessorError::Http(e) => StormError::Network(e.to_string()),
            ProcessorError::Io(e) => StormError::Storage(e.to_string()),
            ProcessorError::Dap(_) | ProcessorError::NetCdf(_) => {
                StormError::DataFormat(err.to_string())
            }
            ProcessorError::Storm(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dimensions_are_not_retryable() {
        let err: StormError = ProcessorError::MissingDimensions {
            url: "https://example.org/dap/winds".to_string(),
            missing: vec!["latitude".to_string()],
        }
        .into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_errors_are_retryable() {
        let err: StormError =
            ProcessorError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")).into();
        assert!(err.is_retryable());
    }
}
