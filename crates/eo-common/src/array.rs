//! N-dimensional array values.
//!
//! Payloads extracted from legacy products are carried as a flat,
//! row-major buffer plus an explicit shape. Rank 0 (a scalar) is a
//! shape of `[]` with exactly one element.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by array construction and axis operations.
#[derive(Error, Debug)]
pub enum ArrayError {
    #[error("Buffer length {len} does not match shape {shape:?}")]
    ShapeMismatch { len: usize, shape: Vec<usize> },

    #[error("Axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: usize, rank: usize },

    #[error("Index {index} out of range for axis {axis} of extent {extent}")]
    IndexOutOfRange { index: usize, axis: usize, extent: usize },

    #[error("Operation not supported for {dtype} values")]
    UnsupportedDtype { dtype: &'static str },

    #[error("Cannot pack {extent} flag positions into a 64-bit word")]
    PackExtentTooLarge { extent: usize },
}

/// Flat value buffer of an [`NdArray`], tagged by element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayValues {
    UInt64(Vec<u64>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Text(Vec<String>),
}

impl ArrayValues {
    /// Number of elements in the buffer.
    pub fn len(&self) -> usize {
        match self {
            ArrayValues::UInt64(v) => v.len(),
            ArrayValues::Int64(v) => v.len(),
            ArrayValues::Float32(v) => v.len(),
            ArrayValues::Float64(v) => v.len(),
            ArrayValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short element-type name, as used in store metadata.
    pub fn dtype(&self) -> &'static str {
        match self {
            ArrayValues::UInt64(_) => "uint64",
            ArrayValues::Int64(_) => "int64",
            ArrayValues::Float32(_) => "float32",
            ArrayValues::Float64(_) => "float64",
            ArrayValues::Text(_) => "string",
        }
    }
}

/// Gather elements of `data` at `ranges` of contiguous runs.
///
/// Each entry is `(start, len)` into the flat buffer; runs are copied
/// in order into a fresh buffer.
fn gather<T: Clone>(data: &[T], runs: &[(usize, usize)]) -> Vec<T> {
    let total: usize = runs.iter().map(|(_, l)| l).sum();
    let mut out = Vec::with_capacity(total);
    for &(start, len) in runs {
        out.extend_from_slice(&data[start..start + len]);
    }
    out
}

/// An n-dimensional array: row-major buffer plus explicit shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    shape: Vec<usize>,
    values: ArrayValues,
}

impl NdArray {
    /// Create an array, checking the buffer length against the shape.
    pub fn new(shape: Vec<usize>, values: ArrayValues) -> Result<Self, ArrayError> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(ArrayError::ShapeMismatch { len: values.len(), shape });
        }
        Ok(Self { shape, values })
    }

    /// 1-D array from a u64 buffer.
    pub fn from_u64(values: Vec<u64>) -> Self {
        Self { shape: vec![values.len()], values: ArrayValues::UInt64(values) }
    }

    /// 1-D array from an f64 buffer.
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self { shape: vec![values.len()], values: ArrayValues::Float64(values) }
    }

    /// 1-D array from an f32 buffer.
    pub fn from_f32(values: Vec<f32>) -> Self {
        Self { shape: vec![values.len()], values: ArrayValues::Float32(values) }
    }

    /// 1-D array of strings.
    pub fn from_text(values: Vec<String>) -> Self {
        Self { shape: vec![values.len()], values: ArrayValues::Text(values) }
    }

    /// Rank-0 (scalar) f64 array.
    pub fn scalar_f64(value: f64) -> Self {
        Self { shape: vec![], values: ArrayValues::Float64(vec![value]) }
    }

    /// Rank-0 (scalar) string array.
    pub fn scalar_text(value: String) -> Self {
        Self { shape: vec![], values: ArrayValues::Text(vec![value]) }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &ArrayValues {
        &self.values
    }

    pub fn into_values(self) -> ArrayValues {
        self.values
    }

    /// Reinterpret the buffer under a new shape of the same length.
    pub fn reshape(self, shape: Vec<usize>) -> Result<Self, ArrayError> {
        Self::new(shape, self.values)
    }

    /// Index `axis` at `index`, removing that axis from the shape.
    ///
    /// A rank-n array becomes rank n-1; selecting on a rank-1 array
    /// yields a scalar.
    pub fn select(&self, axis: usize, index: usize) -> Result<Self, ArrayError> {
        let rank = self.rank();
        if axis >= rank {
            return Err(ArrayError::AxisOutOfRange { axis, rank });
        }
        let extent = self.shape[axis];
        if index >= extent {
            return Err(ArrayError::IndexOutOfRange { index, axis, extent });
        }
        let inner: usize = self.shape[axis + 1..].iter().product();
        let outer: usize = self.shape[..axis].iter().product();
        let runs: Vec<(usize, usize)> = (0..outer)
            .map(|o| (o * extent * inner + index * inner, inner))
            .collect();
        let values = match &self.values {
            ArrayValues::UInt64(d) => ArrayValues::UInt64(gather(d, &runs)),
            ArrayValues::Int64(d) => ArrayValues::Int64(gather(d, &runs)),
            ArrayValues::Float32(d) => ArrayValues::Float32(gather(d, &runs)),
            ArrayValues::Float64(d) => ArrayValues::Float64(gather(d, &runs)),
            ArrayValues::Text(d) => ArrayValues::Text(gather(d, &runs)),
        };
        let mut shape = self.shape.clone();
        shape.remove(axis);
        Ok(Self { shape, values })
    }

    /// Collapse `axis` into per-element unsigned flag words.
    ///
    /// Position `k` along the axis contributes bit `k` (bit 0 is least
    /// significant) whenever the element there is non-zero. The axis is
    /// removed; the rest of the shape is preserved. Fails on textual
    /// buffers and on axes wider than the 64-bit word.
    pub fn pack_bits(&self, axis: usize) -> Result<Self, ArrayError> {
        let rank = self.rank();
        if axis >= rank {
            return Err(ArrayError::AxisOutOfRange { axis, rank });
        }
        let extent = self.shape[axis];
        if extent > 64 {
            return Err(ArrayError::PackExtentTooLarge { extent });
        }
        let inner: usize = self.shape[axis + 1..].iter().product();
        let outer: usize = self.shape[..axis].iter().product();
        let mut out = vec![0u64; outer * inner];
        for o in 0..outer {
            for k in 0..extent {
                let base = o * extent * inner + k * inner;
                for i in 0..inner {
                    if self.bit_source(base + i)? {
                        out[o * inner + i] |= 1 << k;
                    }
                }
            }
        }
        let mut shape = self.shape.clone();
        shape.remove(axis);
        Ok(Self { shape, values: ArrayValues::UInt64(out) })
    }

    /// Whether the flat element at `idx` counts as a set bit.
    fn bit_source(&self, idx: usize) -> Result<bool, ArrayError> {
        match &self.values {
            ArrayValues::UInt64(d) => Ok(d[idx] != 0),
            ArrayValues::Int64(d) => Ok(d[idx] != 0),
            ArrayValues::Float32(d) => Ok(d[idx] != 0.0),
            ArrayValues::Float64(d) => Ok(d[idx] != 0.0),
            ArrayValues::Text(_) => Err(ArrayError::UnsupportedDtype { dtype: "string" }),
        }
    }

    /// Flat element as f64, when numeric.
    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        match &self.values {
            ArrayValues::UInt64(d) => d.get(idx).map(|v| *v as f64),
            ArrayValues::Int64(d) => d.get(idx).map(|v| *v as f64),
            ArrayValues::Float32(d) => d.get(idx).map(|v| *v as f64),
            ArrayValues::Float64(d) => d.get(idx).copied(),
            ArrayValues::Text(_) => None,
        }
    }
}

/// Placeholder dimension names for an array of the given rank
/// (`dim_0`, `dim_1`, ...). Used until a mapping entry renames them.
pub fn default_dims(rank: usize) -> Vec<String> {
    (0..rank).map(|i| format!("dim_{i}")).collect()
}
