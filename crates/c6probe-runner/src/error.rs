//! Runner error type.

use c6probe_device::DeviceError;
use c6probe_model::ModelError;
use thiserror::Error;

/// Errors that stop a run before a report can be produced.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Missing or contradictory settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catalog or change request problem.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Connection failure or unusable plan.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Run configuration file could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Output could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
