//! NetCDF classic accessor.
//!
//! Parses the self-describing classic binary format (CDF-1 and the
//! 64-bit-offset CDF-2 variant): a header listing dimensions, global
//! attributes and variables, followed by big-endian array payloads.
//! Fixed-size variables live at their recorded offset; record
//! variables are interleaved per record along the unlimited dimension.
//! The whole file is decoded at open, so reads never touch the
//! filesystem.

use std::path::Path;

use serde_json::{json, Value};

use eo_common::{ArrayValues, Attributes, NdArray};

use crate::error::{AccessorError, Result};
use crate::registry::AccessorConfig;
use crate::{FormatAccessor, Item};

const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;

const NC_BYTE: u32 = 1;
const NC_CHAR: u32 = 2;
const NC_SHORT: u32 = 3;
const NC_INT: u32 = 4;
const NC_FLOAT: u32 = 5;
const NC_DOUBLE: u32 = 6;

/// Record count sentinel for streaming writers.
const STREAMING: u32 = 0xFFFF_FFFF;

fn element_size(nc_type: u32) -> Result<usize> {
    match nc_type {
        NC_BYTE | NC_CHAR => Ok(1),
        NC_SHORT => Ok(2),
        NC_INT | NC_FLOAT => Ok(4),
        NC_DOUBLE => Ok(8),
        other => Err(AccessorError::Format(format!("unknown element type {other}"))),
    }
}

/// Big-endian cursor over the file buffer.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                AccessorError::Format(format!("truncated header at byte {}", self.pos))
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Length-prefixed name, padded to the 4-byte boundary.
    fn name(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        self.take(pad4(len))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| AccessorError::Format("name is not valid UTF-8".into()))
    }

    /// List header: `(tag, nelems)` where a zero tag with zero count
    /// marks an absent list.
    fn list(&mut self, expected_tag: u32, what: &str) -> Result<usize> {
        let tag = self.u32()?;
        let nelems = self.u32()? as usize;
        if tag == 0 && nelems == 0 {
            return Ok(0);
        }
        if tag != expected_tag {
            return Err(AccessorError::Format(format!(
                "expected {what} list tag {expected_tag:#x}, got {tag:#x}"
            )));
        }
        Ok(nelems)
    }
}

fn pad4(len: usize) -> usize {
    (4 - len % 4) % 4
}

#[derive(Debug, Clone)]
struct Dimension {
    name: String,
    /// Zero marks the unlimited (record) dimension.
    length: usize,
}

/// One fully decoded variable.
#[derive(Debug, Clone)]
struct NcVariable {
    name: String,
    dims: Vec<String>,
    array: NdArray,
    attrs: Attributes,
}

/// Accessor over one NetCDF classic file.
pub struct NetcdfAccessor {
    global_attrs: Attributes,
    variables: Vec<NcVariable>,
}

impl NetcdfAccessor {
    /// Decode the whole file. The file handle is released before this
    /// returns.
    pub fn open(path: &Path, _config: &AccessorConfig) -> Result<Self> {
        let buffer = std::fs::read(path)?;
        Self::from_bytes(&buffer)
    }

    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buffer);
        let magic = cur.take(4)?;
        if &magic[..3] != b"CDF" {
            return Err(AccessorError::Format("not a NetCDF classic file".into()));
        }
        let version = magic[3];
        if version != 1 && version != 2 {
            return Err(AccessorError::Format(format!(
                "unsupported NetCDF format version {version}"
            )));
        }

        let numrecs = cur.u32()?;
        if numrecs == STREAMING {
            return Err(AccessorError::Format("indeterminate record count".into()));
        }
        let numrecs = numrecs as usize;

        let ndims = cur.list(NC_DIMENSION, "dimension")?;
        let mut dimensions = Vec::with_capacity(ndims);
        for _ in 0..ndims {
            let name = cur.name()?;
            let length = cur.u32()? as usize;
            dimensions.push(Dimension { name, length });
        }

        let global_attrs = read_attr_list(&mut cur)?;

        let nvars = cur.list(NC_VARIABLE, "variable")?;
        let mut headers = Vec::with_capacity(nvars);
        for _ in 0..nvars {
            let name = cur.name()?;
            let rank = cur.u32()? as usize;
            let mut dimids = Vec::with_capacity(rank);
            for _ in 0..rank {
                let id = cur.u32()? as usize;
                if id >= dimensions.len() {
                    return Err(AccessorError::Format(format!(
                        "variable '{name}' references unknown dimension {id}"
                    )));
                }
                dimids.push(id);
            }
            let attrs = read_attr_list(&mut cur)?;
            let nc_type = cur.u32()?;
            element_size(nc_type)?;
            let vsize = cur.u32()? as u64;
            let begin = if version == 1 { cur.u32()? as u64 } else { cur.u64()? };
            headers.push((name, dimids, attrs, nc_type, vsize, begin));
        }

        // record variables share one interleaved stride per record
        let is_record =
            |dimids: &[usize]| dimids.first().is_some_and(|&id| dimensions[id].length == 0);
        let record_stride: u64 = headers
            .iter()
            .filter(|(_, dimids, ..)| is_record(dimids))
            .map(|(.., vsize, _)| *vsize)
            .sum();

        let mut variables = Vec::with_capacity(headers.len());
        for (name, dimids, attrs, nc_type, _vsize, begin) in headers {
            let record = is_record(&dimids);
            let shape: Vec<usize> = dimids
                .iter()
                .map(|&id| if dimensions[id].length == 0 { numrecs } else { dimensions[id].length })
                .collect();
            let dims: Vec<String> =
                dimids.iter().map(|&id| dimensions[id].name.clone()).collect();

            let elsize = element_size(nc_type)?;
            let payload = if record {
                let per_record: usize = shape[1..].iter().product();
                let slab = per_record * elsize;
                let mut bytes = Vec::with_capacity(slab * numrecs);
                for r in 0..numrecs as u64 {
                    let start = begin + r * record_stride;
                    bytes.extend_from_slice(slice_at(&buffer[..], &name, start, slab)?);
                }
                bytes
            } else {
                let count: usize = shape.iter().product();
                slice_at(&buffer[..], &name, begin, count * elsize)?.to_vec()
            };

            let array = decode_payload(&payload, nc_type, &shape, &name)?;
            let dims = if nc_type == NC_CHAR && !dims.is_empty() {
                // the trailing string-length dimension was collapsed
                dims[..dims.len() - 1].to_vec()
            } else {
                dims
            };
            variables.push(NcVariable { name, dims, array, attrs });
        }

        Ok(Self { global_attrs, variables })
    }
}

fn slice_at<'a>(buffer: &'a [u8], name: &str, start: u64, len: usize) -> Result<&'a [u8]> {
    let start = usize::try_from(start)
        .map_err(|_| AccessorError::Format(format!("variable '{name}' offset out of range")))?;
    start
        .checked_add(len)
        .and_then(|end| buffer.get(start..end))
        .ok_or_else(|| AccessorError::Format(format!("variable '{name}' data is truncated")))
}

fn read_attr_list(cur: &mut Cursor<'_>) -> Result<Attributes> {
    let nattrs = cur.list(NC_ATTRIBUTE, "attribute")?;
    let mut attrs = Attributes::new();
    for _ in 0..nattrs {
        let name = cur.name()?;
        let nc_type = cur.u32()?;
        let count = cur.u32()? as usize;
        let elsize = element_size(nc_type)?;
        let bytes = cur.take(count * elsize)?;
        cur.take(pad4(count * elsize))?;
        attrs.insert(name, attr_value(bytes, nc_type, count)?);
    }
    Ok(attrs)
}

fn attr_value(bytes: &[u8], nc_type: u32, count: usize) -> Result<Value> {
    if nc_type == NC_CHAR {
        let text = String::from_utf8_lossy(bytes);
        return Ok(json!(text.trim_end_matches('\0')));
    }
    let values: Vec<Value> = match nc_type {
        NC_BYTE => bytes.iter().map(|&b| json!(b as i8 as i64)).collect(),
        NC_SHORT => chunks2(bytes).map(|b| json!(i16::from_be_bytes(b) as i64)).collect(),
        NC_INT => chunks4(bytes).map(|b| json!(i32::from_be_bytes(b) as i64)).collect(),
        NC_FLOAT => chunks4(bytes).map(|b| json!(f32::from_be_bytes(b) as f64)).collect(),
        NC_DOUBLE => chunks8(bytes).map(|b| json!(f64::from_be_bytes(b))).collect(),
        other => return Err(AccessorError::Format(format!("unknown element type {other}"))),
    };
    if count == 1 {
        Ok(values.into_iter().next().unwrap_or(Value::Null))
    } else {
        Ok(Value::Array(values))
    }
}

fn decode_payload(bytes: &[u8], nc_type: u32, shape: &[usize], name: &str) -> Result<NdArray> {
    if nc_type == NC_CHAR {
        // char arrays read as strings: the last dimension is the
        // per-string length
        let row_len = shape.last().copied().unwrap_or(1).max(1);
        let strings: Vec<String> = bytes
            .chunks(row_len)
            .map(|row| String::from_utf8_lossy(row).trim_end_matches('\0').to_string())
            .collect();
        let out_shape = if shape.is_empty() { Vec::new() } else { shape[..shape.len() - 1].to_vec() };
        return NdArray::new(out_shape, ArrayValues::Text(strings)).map_err(|e| {
            AccessorError::Format(format!("variable '{name}' has inconsistent shape: {e}"))
        });
    }
    let values = match nc_type {
        NC_BYTE => ArrayValues::Int64(bytes.iter().map(|&b| b as i8 as i64).collect()),
        NC_SHORT => ArrayValues::Int64(chunks2(bytes).map(|b| i16::from_be_bytes(b) as i64).collect()),
        NC_INT => ArrayValues::Int64(chunks4(bytes).map(|b| i32::from_be_bytes(b) as i64).collect()),
        NC_FLOAT => ArrayValues::Float32(chunks4(bytes).map(f32::from_be_bytes).collect()),
        NC_DOUBLE => ArrayValues::Float64(chunks8(bytes).map(f64::from_be_bytes).collect()),
        other => return Err(AccessorError::Format(format!("unknown element type {other}"))),
    };
    NdArray::new(shape.to_vec(), values).map_err(|e| {
        AccessorError::Format(format!("variable '{name}' has inconsistent shape: {e}"))
    })
}

fn chunks2(bytes: &[u8]) -> impl Iterator<Item = [u8; 2]> + '_ {
    bytes.chunks_exact(2).map(|b| [b[0], b[1]])
}

fn chunks4(bytes: &[u8]) -> impl Iterator<Item = [u8; 4]> + '_ {
    bytes.chunks_exact(4).map(|b| [b[0], b[1], b[2], b[3]])
}

fn chunks8(bytes: &[u8]) -> impl Iterator<Item = [u8; 8]> + '_ {
    bytes.chunks_exact(8).map(|b| [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

impl FormatAccessor for NetcdfAccessor {
    /// The empty key yields the global attributes; any other key names
    /// a variable.
    fn read_item(&self, local_path: &str) -> Result<Item> {
        let key = local_path.trim_matches('/');
        if key.is_empty() {
            return Ok(Item::attrs_only(self.global_attrs.clone()));
        }
        let variable = self
            .variables
            .iter()
            .find(|v| v.name == key)
            .ok_or_else(|| AccessorError::KeyNotFound(key.to_string()))?;
        Ok(Item::from_array(variable.array.clone())
            .with_dims(variable.dims.clone())
            .with_attrs(variable.attrs.clone()))
    }

    fn item_keys(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }
}
