//! Store abstraction for harmonized products.
//!
//! A [`ProductStore`] is a byte-addressable hierarchical namespace the
//! data model persists to and loads from. Two implementations ship
//! here: a Zarr V3 filesystem store used for real products and an
//! in-memory store used by tests and staging pipelines.
//!
//! The store never interprets variable content; it moves arrays,
//! dimension-name tuples and attribute dictionaries byte-exactly.

pub mod error;
pub mod memory;
pub mod zarr;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use zarr::ZarrStore;

use eo_common::{Attributes, NdArray};

/// How a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create a fresh product; the target must not already hold one.
    NewProduct,
    /// Read an existing product, rejecting all writes.
    ReadOnly,
    /// Read and update an existing product in place.
    InPlace,
}

impl OpenMode {
    /// Parse the wire-level mode names (`newproduct|readonly|inplace`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "newproduct" => Some(OpenMode::NewProduct),
            "readonly" => Some(OpenMode::ReadOnly),
            "inplace" => Some(OpenMode::InPlace),
            _ => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

/// A variable as it exists in a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVariable {
    pub array: NdArray,
    pub dims: Vec<String>,
    pub attrs: Attributes,
}

/// Kind of a child node returned by [`ProductStore::listdir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Group,
    Variable,
}

/// One child node of a store path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Uniform read/write contract over chunked-array persistence.
///
/// Paths are slash-separated and relative to the product root; the
/// empty string addresses the root itself. Every operation other than
/// `open` fails with [`StoreError::NotOpen`] on a closed store, and
/// writes fail with [`StoreError::ReadOnly`] under
/// [`OpenMode::ReadOnly`].
pub trait ProductStore {
    /// Open the store in the given mode.
    fn open(&mut self, mode: OpenMode) -> Result<()>;

    /// Close the store, releasing the backing resource. Lazy readers
    /// holding this store fail afterwards instead of returning stale
    /// data.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    fn mode(&self) -> Option<OpenMode>;

    /// Persist a variable (array + dims + attrs) at `path`, creating
    /// intermediate groups as needed.
    fn write_variable(
        &mut self,
        path: &str,
        array: &NdArray,
        dims: &[String],
        attrs: &Attributes,
    ) -> Result<()>;

    /// Read back a variable exactly as written.
    fn read_variable(&self, path: &str) -> Result<StoredVariable>;

    /// Merge attributes onto the group at `path` (the empty path is the
    /// product root), creating the group if absent.
    fn write_attrs(&mut self, path: &str, attrs: &Attributes) -> Result<()>;

    /// Attributes of the group at `path`.
    fn read_attrs(&self, path: &str) -> Result<Attributes>;

    /// Children of the group at `path`.
    fn listdir(&self, path: &str) -> Result<Vec<StoreEntry>>;

    /// Whether `path` names a variable.
    fn is_variable(&self, path: &str) -> Result<bool>;
}
