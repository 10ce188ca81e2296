//! Error types for the store crate.

use thiserror::Error;

/// Errors that can occur while reading or writing a product store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store is not open")]
    NotOpen,

    #[error("Store is open read-only")]
    ReadOnly,

    #[error("No such node in store: {0}")]
    KeyNotFound(String),

    #[error("Unsupported store operation: {0}")]
    Unsupported(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array error: {0}")]
    Array(#[from] eo_common::ArrayError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
