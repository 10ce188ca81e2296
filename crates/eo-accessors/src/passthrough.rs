//! Opaque byte-stream accessor.
//!
//! Last-resort adapter for resources no structured accessor claims:
//! the whole file becomes a 1-D array of byte values so it can still
//! be carried through a conversion and inspected afterwards.

use std::path::Path;

use serde_json::json;

use eo_common::{Attributes, NdArray};

use crate::error::Result;
use crate::registry::AccessorConfig;
use crate::{FormatAccessor, Item};

pub struct PassthroughAccessor {
    bytes: Vec<u8>,
}

impl PassthroughAccessor {
    pub fn open(path: &Path, _config: &AccessorConfig) -> Result<Self> {
        Ok(Self { bytes: std::fs::read(path)? })
    }
}

impl FormatAccessor for PassthroughAccessor {
    /// Every key reads the same payload; there is nothing to address
    /// inside an opaque stream.
    fn read_item(&self, _local_path: &str) -> Result<Item> {
        let values: Vec<u64> = self.bytes.iter().map(|&b| b as u64).collect();
        let mut attrs = Attributes::new();
        attrs.insert("size".into(), json!(self.bytes.len()));
        Ok(Item::from_array(NdArray::from_u64(values)).with_attrs(attrs))
    }

    fn item_keys(&self) -> Vec<String> {
        vec!["data".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eo_common::ArrayValues;
    use std::io::Write;

    #[test]
    fn whole_file_becomes_a_byte_vector() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0x01, 0xFF, 0x10]).unwrap();
        let accessor = PassthroughAccessor::open(f.path(), &AccessorConfig::new()).unwrap();
        let item = accessor.read_item("data").unwrap();
        assert_eq!(item.attrs.get("size"), Some(&json!(3)));
        let array = item.array.unwrap();
        assert_eq!(array.shape(), &[3]);
        assert_eq!(array.values(), &ArrayValues::UInt64(vec![1, 255, 16]));
    }
}
