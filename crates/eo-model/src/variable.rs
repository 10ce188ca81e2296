//! Variables: named leaves wrapping an n-dimensional array.

use std::collections::BTreeSet;

use eo_common::{Attributes, NdArray};

use crate::error::{ModelError, Result};

/// Payload state of a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableData {
    /// Array held in memory.
    Loaded(NdArray),
    /// Array still in the bound store, addressed by its tree path.
    Lazy { store_path: String, shape: Vec<usize> },
}

/// A named leaf node: array payload, dimension names, attributes.
///
/// Dimension names are unique within one variable and their count
/// always equals the array rank; both are enforced at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    dims: Vec<String>,
    attrs: Attributes,
    data: VariableData,
}

impl Variable {
    /// Create a materialized variable, validating the dimension tuple.
    pub fn new(name: impl Into<String>, array: NdArray, dims: Vec<String>, attrs: Attributes) -> Result<Self> {
        if dims.len() != array.rank() {
            return Err(ModelError::DimensionMismatch { declared: dims.len(), rank: array.rank() });
        }
        check_unique_dims(&dims)?;
        Ok(Self { name: name.into(), dims, attrs, data: VariableData::Loaded(array) })
    }

    /// Create a lazy variable whose payload still lives in the store.
    pub fn new_lazy(
        name: impl Into<String>,
        store_path: impl Into<String>,
        shape: Vec<usize>,
        dims: Vec<String>,
        attrs: Attributes,
    ) -> Result<Self> {
        if dims.len() != shape.len() {
            return Err(ModelError::DimensionMismatch { declared: dims.len(), rank: shape.len() });
        }
        check_unique_dims(&dims)?;
        Ok(Self {
            name: name.into(),
            dims,
            attrs,
            data: VariableData::Lazy { store_path: store_path.into(), shape },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn shape(&self) -> &[usize] {
        match &self.data {
            VariableData::Loaded(array) => array.shape(),
            VariableData::Lazy { shape, .. } => shape,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.data, VariableData::Loaded(_))
    }

    pub fn data(&self) -> &VariableData {
        &self.data
    }

    /// In-memory array, when materialized.
    pub fn array(&self) -> Option<&NdArray> {
        match &self.data {
            VariableData::Loaded(array) => Some(array),
            VariableData::Lazy { .. } => None,
        }
    }

    /// Replace a lazy payload with its materialized array.
    pub(crate) fn materialize(&mut self, array: NdArray) -> Result<()> {
        if array.rank() != self.dims.len() {
            return Err(ModelError::DimensionMismatch { declared: self.dims.len(), rank: array.rank() });
        }
        self.data = VariableData::Loaded(array);
        Ok(())
    }
}

fn check_unique_dims(dims: &[String]) -> Result<()> {
    let unique: BTreeSet<_> = dims.iter().collect();
    if unique.len() != dims.len() {
        return Err(ModelError::InvalidStructure(format!(
            "duplicate dimension names in {dims:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_count_must_match_rank() {
        let arr = NdArray::from_u64(vec![1, 2, 3]);
        let err = Variable::new("v", arr, vec!["a".into(), "b".into()], Attributes::new());
        assert!(matches!(err, Err(ModelError::DimensionMismatch { declared: 2, rank: 1 })));
    }

    #[test]
    fn duplicate_dims_rejected() {
        let arr = NdArray::new(vec![2, 2], eo_common::ArrayValues::UInt64(vec![0; 4])).unwrap();
        let err = Variable::new("v", arr, vec!["x".into(), "x".into()], Attributes::new());
        assert!(matches!(err, Err(ModelError::InvalidStructure(_))));
    }
}
