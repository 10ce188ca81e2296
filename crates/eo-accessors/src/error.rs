//! Error types for the accessor crate.

use thiserror::Error;

/// Errors raised while opening or reading a legacy resource.
#[derive(Error, Debug)]
pub enum AccessorError {
    /// The resource exists but cannot be parsed by this accessor.
    #[error("Format error: {0}")]
    Format(String),

    /// The requested item does not exist inside the resource.
    #[error("No such item: {0}")]
    KeyNotFound(String),

    /// A required accessor configuration parameter is absent or malformed.
    #[error("Missing configuration parameter: {0}")]
    MissingConfig(String),

    /// No accessor is registered under the requested format name.
    #[error("No registered accessor for format: {0}")]
    UnknownFormat(String),

    #[error("Unsupported accessor operation: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array error: {0}")]
    Array(#[from] eo_common::ArrayError),
}

impl From<eo_store::StoreError> for AccessorError {
    fn from(err: eo_store::StoreError) -> Self {
        match err {
            eo_store::StoreError::KeyNotFound(key) => AccessorError::KeyNotFound(key),
            other => AccessorError::Format(other.to_string()),
        }
    }
}

/// Result type for accessor operations.
pub type Result<T> = std::result::Result<T, AccessorError>;
