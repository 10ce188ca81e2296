//! Mapping-driven conversion of legacy satellite products.
//!
//! A mapping document declares, per logical variable, where its bytes
//! live inside a legacy product, which accessor decodes them, and how
//! the decoded payload is reshaped and renamed before it lands in the
//! harmonized Product/Group/Variable tree. This crate owns the
//! document model, the source-path resolver, the transformation
//! pipeline and the engine driving a conversion run.

pub mod document;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod resolver;

pub use document::{MappingDocument, MappingEntry, Parameters, Recognition};
pub use engine::{ConversionReport, MappingEngine, RunState, SkippedEntry};
pub use error::{MappingError, Result};
pub use pipeline::Transformed;
