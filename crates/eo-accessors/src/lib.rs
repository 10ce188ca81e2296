//! Format accessors for legacy Earth-observation products.
//!
//! Every legacy sub-format (packed telemetry, XML manifests and angle
//! grids, GRIB messages, NetCDF classic files, raster imagery, gridded
//! containers, opaque byte streams) is adapted behind one small
//! capability contract:
//! open a resource, read an item by a format-specific key, enumerate
//! items when the resource is a container. New formats register in the
//! [`AccessorRegistry`] under their `item_format` name; nothing in the
//! mapping engine knows concrete accessor types.
//!
//! Opening parses the resource up front and releases the file handle
//! immediately, so an accessor never holds an open descriptor past
//! `open` regardless of how reads go.

pub mod angles;
pub mod binary;
pub mod error;
pub mod grib;
pub mod gridded;
pub mod metadata;
pub mod netcdf;
pub mod passthrough;
pub mod raster;
pub mod registry;
pub mod xml;

pub use error::{AccessorError, Result};
pub use registry::{AccessorConfig, AccessorRegistry};

use eo_common::{Attributes, NdArray};

/// One extracted item: raw payload plus native attributes.
///
/// Metadata-only items (extraction templates) carry no array; their
/// attributes are merged into the target node instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub array: Option<NdArray>,
    /// Native dimension names, when the format defines them. Empty
    /// means "let the caller assign placeholders".
    pub dims: Vec<String>,
    pub attrs: Attributes,
}

impl Item {
    pub fn from_array(array: NdArray) -> Self {
        Self { array: Some(array), dims: Vec::new(), attrs: Attributes::new() }
    }

    pub fn attrs_only(attrs: Attributes) -> Self {
        Self { array: None, dims: Vec::new(), attrs }
    }

    pub fn with_dims(mut self, dims: Vec<String>) -> Self {
        self.dims = dims;
        self
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }
}

/// Uniform capability contract over one opened legacy resource.
pub trait FormatAccessor {
    /// Read one item by its accessor-specific key.
    fn read_item(&self, local_path: &str) -> Result<Item>;

    /// Keys of the enumerable items, in stable order. Empty for
    /// formats that are not containers.
    fn item_keys(&self) -> Vec<String>;

    /// Lazy, restartable iteration over all enumerable items.
    fn iter_items(&self) -> Box<dyn Iterator<Item = Result<(String, Item)>> + '_> {
        Box::new(
            self.item_keys()
                .into_iter()
                .map(move |key| self.read_item(&key).map(|item| (key, item))),
        )
    }
}
