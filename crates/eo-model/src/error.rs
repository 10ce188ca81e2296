//! Error types for the data model crate.

use thiserror::Error;

/// Errors raised by the product tree and its store binding.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("No such node: {0}")]
    KeyNotFound(String),

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Variable declares {declared} dimension(s) but the array has rank {rank}")]
    DimensionMismatch { declared: usize, rank: usize },

    #[error("No store bound to this product")]
    StoreNotDefined,

    #[error("Store error: {0}")]
    Store(#[from] eo_store::StoreError),

    #[error("Array error: {0}")]
    Array(#[from] eo_common::ArrayError),
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
