//! Error types for storm archival services.

use thiserror::Error;

/// Result type alias using StormError.
pub type StormResult<T> = Result<T, StormError>;

/// Primary error type shared by every crate in the workspace.
#[derive(Debug, Error)]
pub enum StormError {
    // === Fatal ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    // === Transient ===
    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue error: {0}")]
    Queue(String),

    // === State conflicts ===
    #[error("Validation failed: {0}")]
    Validation(String),

    // === Data ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data format: {0}")]
    DataFormat(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StormError {
    /// Whether the task retry policy should re-run the work that raised this error.
    ///
    /// Configuration and validation failures are reported immediately.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            StormError::Configuration(_) | StormError::Validation(_)
        )
    }

    /// HTTP status code used when the error crosses the API boundary.
    pub fn http_status_code(&self) -> u16 {
        match self {
            StormError::Validation(_) | StormError::Configuration(_) => 400,
            StormError::NotFound(_) => 404,
            StormError::Network(_) | StormError::Queue(_) => 503,
            _ => 500,
        }
    }
}

impl From<std::io::Error> for StormError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StormError::NotFound(err.to_string())
        } else {
            StormError::Storage(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StormError {
    fn from(err: serde_json::Error) -> Self {
        StormError::DataFormat(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for StormError {
    fn from(err: serde_yaml::Error) -> Self {
        StormError::Configuration(format!("YAML error: {}", err))
    }
}
