//! Declared transformation pipeline.
//!
//! Raw accessor output passes through up to four stages in fixed
//! order: `sub_array`, `pack_bits`, `dimensions`, `attributes`. The
//! order is load-bearing: indexing and bit packing change the rank the
//! rename stage validates against, and the rename fixes the names the
//! attribute stage documents.

use eo_accessors::Item;
use eo_common::array::default_dims;
use eo_common::{merge_attrs, Attributes, NdArray};

use crate::document::Parameters;
use crate::error::{MappingError, Result};

/// Fully transformed payload ready to enter the harmonized tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub array: NdArray,
    pub dims: Vec<String>,
    pub attrs: Attributes,
}

/// Apply `parameters` to one accessor item carrying an array.
pub fn apply(parameters: &Parameters, item: Item) -> Result<Transformed> {
    let Item { array, dims, attrs } = item;
    let mut array = array.ok_or_else(|| {
        MappingError::InvalidConfig("transformation pipeline applied to a metadata-only item".into())
    })?;
    let mut dims = if dims.len() == array.rank() {
        dims
    } else {
        default_dims(array.rank())
    };
    let mut attrs = attrs;

    if let Some(spec) = &parameters.sub_array {
        for (dim, index) in spec {
            let index = index.as_u64().ok_or_else(|| {
                MappingError::InvalidConfig(format!(
                    "sub_array index for '{dim}' must be a non-negative integer"
                ))
            })? as usize;
            let axis = dims.iter().position(|d| d == dim).ok_or_else(|| {
                MappingError::InvalidConfig(format!(
                    "sub_array names unknown dimension '{dim}' (have {dims:?})"
                ))
            })?;
            array = array.select(axis, index)?;
            dims.remove(axis);
        }
    }

    if let Some(bit_dim) = &parameters.pack_bits {
        // absent bit dimension means the data is already packed
        if let Some(axis) = dims.iter().position(|d| d == bit_dim) {
            array = array.pack_bits(axis)?;
            dims.remove(axis);
        }
    }

    if let Some(declared) = &parameters.dimensions {
        if declared.len() != array.rank() {
            return Err(MappingError::DimensionMismatch {
                declared: declared.len(),
                rank: array.rank(),
            });
        }
        dims = declared.clone();
    }

    if let Some(declared) = &parameters.attributes {
        merge_attrs(&mut attrs, declared);
    }

    Ok(Transformed { array, dims, attrs })
}
