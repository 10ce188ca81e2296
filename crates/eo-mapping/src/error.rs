//! Error types for mapping-driven conversion.

use thiserror::Error;

/// Errors raised while loading mapping documents or running a
/// conversion.
#[derive(Error, Debug)]
pub enum MappingError {
    /// No registered mapping document recognizes the legacy product.
    #[error("No mapping document recognizes product '{0}'")]
    UnrecognizedProduct(String),

    /// A source-path pattern matched nothing in the legacy product.
    #[error("No file matches pattern '{0}'")]
    ResourceNotFound(String),

    /// A source-path pattern matched more than one file. Ambiguity is
    /// always fatal; the pattern must be tightened, not guessed at.
    #[error("Pattern '{pattern}' matches {count} files; expected exactly one")]
    AmbiguousMapping { pattern: String, count: usize },

    /// A declared dimension list does not fit the array it names.
    #[error("Declared {declared} dimension names for a rank-{rank} array")]
    DimensionMismatch { declared: usize, rank: usize },

    /// The mapping document itself is malformed.
    #[error("Invalid mapping configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Accessor(#[from] eo_accessors::AccessorError),

    #[error(transparent)]
    Model(#[from] eo_model::ModelError),

    #[error(transparent)]
    Store(#[from] eo_store::StoreError),

    #[error("Array error: {0}")]
    Array(#[from] eo_common::ArrayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mapping document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for mapping operations.
pub type Result<T> = std::result::Result<T, MappingError>;
