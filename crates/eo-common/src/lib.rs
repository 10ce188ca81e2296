//! Shared building blocks for the harmonization workspace.
//!
//! This crate carries the types every other crate agrees on:
//!
//! - slash-separated hierarchy paths ([`path`])
//! - CF-style attribute dictionaries ([`attrs`])
//! - the n-dimensional array value type ([`NdArray`])
//! - the read-only file listing of a legacy product ([`listing`])

pub mod array;
pub mod attrs;
pub mod listing;
pub mod path;

pub use array::{ArrayError, ArrayValues, NdArray};
pub use attrs::{merge_attrs, Attributes};
pub use listing::{DirListing, FileListing};
