//! Error types for the configuration model.

use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur when building catalogs or change requests.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Key is not part of the candidate catalog.
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    /// Key listed more than once.
    #[error("duplicate configuration key: {0}")]
    DuplicateKey(String),

    /// Value rejected by the key's domain.
    #[error("invalid value for {key}: {source}")]
    Domain {
        /// Key the value was meant for.
        key: String,
        /// Domain failure.
        #[source]
        source: DomainError,
    },

    /// A `key=value` assignment could not be parsed.
    #[error("invalid assignment '{0}' (expected key=value)")]
    InvalidAssignment(String),

    /// Catalog definition is inconsistent.
    #[error("invalid catalog: {0}")]
    Catalog(String),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
