//! Packed-binary telemetry accessor.
//!
//! Instrument source packets arrive as a stream of records, either
//! fixed-width or length-prefixed (the record length lives in a
//! big-endian header field). A field is addressed by a
//! `start:end:width` bit triple evaluated against every record:
//! `start` is the first bit, `end` the exclusive last bit, `width` the
//! per-element bit width. An omitted `end` marks a variable-length
//! tail field consuming the rest of each record. All bit offsets are
//! interpreted big-endian within the record.

use std::path::Path;

use serde_json::json;

use eo_common::{ArrayValues, Attributes, NdArray};

use crate::error::{AccessorError, Result};
use crate::registry::AccessorConfig;
use crate::{FormatAccessor, Item};

/// Record framing declared in the accessor configuration.
#[derive(Debug, Clone)]
enum Framing {
    /// Every record is exactly this many bytes.
    Fixed { record_length: usize },
    /// Record length is read from a header field: big-endian integer of
    /// `size` bytes at byte `offset`, plus `adjust` gives the total
    /// record length in bytes.
    Prefixed { offset: usize, size: usize, adjust: i64 },
}

impl Framing {
    fn from_config(config: &AccessorConfig) -> Result<Self> {
        if let Some(len) = config.get("record_length") {
            let record_length = len
                .as_u64()
                .ok_or_else(|| AccessorError::MissingConfig("record_length".into()))?
                as usize;
            if record_length == 0 {
                return Err(AccessorError::MissingConfig("record_length must be non-zero".into()));
            }
            return Ok(Framing::Fixed { record_length });
        }
        let get = |key: &str| -> Result<u64> {
            config
                .get(key)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| AccessorError::MissingConfig(key.to_string()))
        };
        let offset = get("length_field_offset")? as usize;
        let size = get("length_field_size")? as usize;
        if size == 0 || size > 8 {
            return Err(AccessorError::MissingConfig("length_field_size must be 1..=8".into()));
        }
        let adjust = config
            .get("length_adjust")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(Framing::Prefixed { offset, size, adjust })
    }
}

/// Parsed `start:end:width` field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BitField {
    start: u64,
    end: Option<u64>,
    width: u64,
}

impl BitField {
    fn parse(key: &str) -> Result<Self> {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() != 3 {
            return Err(AccessorError::Format(format!(
                "bit-field key must be start:end:width, got '{key}'"
            )));
        }
        let parse = |s: &str, what: &str| -> Result<u64> {
            s.trim()
                .parse::<u64>()
                .map_err(|_| AccessorError::Format(format!("invalid {what} in bit-field key '{key}'")))
        };
        let start = parse(parts[0], "start bit")?;
        let end = if parts[1].trim().is_empty() {
            None
        } else {
            Some(parse(parts[1], "end bit")?)
        };
        let width = parse(parts[2], "field width")?;
        if width == 0 || width > 64 {
            return Err(AccessorError::Format(format!(
                "field width must be 1..=64, got {width}"
            )));
        }
        if let Some(end) = end {
            if end <= start || (end - start) % width != 0 {
                return Err(AccessorError::Format(format!(
                    "bit range {start}..{end} is not a multiple of width {width}"
                )));
            }
        }
        Ok(Self { start, end, width })
    }
}

/// Accessor over a packed-binary record stream.
pub struct BinaryAccessor {
    buffer: Vec<u8>,
    /// `(offset, length)` of each record in the buffer.
    records: Vec<(usize, usize)>,
    framing: Framing,
}

impl BinaryAccessor {
    /// Read the whole stream and index its records. The file handle is
    /// released before this returns.
    pub fn open(path: &Path, config: &AccessorConfig) -> Result<Self> {
        let framing = Framing::from_config(config)?;
        let buffer = std::fs::read(path)?;
        let records = index_records(&buffer, &framing)?;
        Ok(Self { buffer, records, framing })
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn native_attrs(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("records".into(), json!(self.records.len()));
        attrs.insert(
            "record_scheme".into(),
            json!(match self.framing {
                Framing::Fixed { .. } => "fixed",
                Framing::Prefixed { .. } => "length-prefixed",
            }),
        );
        attrs
    }

    /// Values of a bounded field: one or more `width`-bit elements per
    /// record.
    fn read_bounded(&self, field: BitField, end: u64) -> Result<NdArray> {
        let per_record = ((end - field.start) / field.width) as usize;
        let mut out = Vec::with_capacity(self.records.len() * per_record);
        for &(offset, length) in &self.records {
            if end > (length as u64) * 8 {
                return Err(AccessorError::Format(format!(
                    "field end bit {end} exceeds record of {length} bytes"
                )));
            }
            for i in 0..per_record {
                let bit = field.start + (i as u64) * field.width;
                out.push(extract_bits(&self.buffer[offset..offset + length], bit, field.width));
            }
        }
        let shape = if per_record == 1 {
            vec![self.records.len()]
        } else {
            vec![self.records.len(), per_record]
        };
        Ok(NdArray::new(shape, ArrayValues::UInt64(out))?)
    }

    /// Variable-length tail: bytes from the field start to the record
    /// end, zero-padded to the longest tail.
    fn read_tail(&self, field: BitField) -> Result<NdArray> {
        let start_byte = (field.start / 8) as usize;
        let tail_len = |len: usize| len.saturating_sub(start_byte);
        let max_tail = self.records.iter().map(|&(_, len)| tail_len(len)).max().unwrap_or(0);
        let mut out = vec![0u64; self.records.len() * max_tail];
        for (row, &(offset, length)) in self.records.iter().enumerate() {
            for (col, &byte) in self.buffer[offset + start_byte.min(length)..offset + length]
                .iter()
                .enumerate()
            {
                out[row * max_tail + col] = byte as u64;
            }
        }
        Ok(NdArray::new(vec![self.records.len(), max_tail], ArrayValues::UInt64(out))?)
    }
}

impl FormatAccessor for BinaryAccessor {
    fn read_item(&self, local_path: &str) -> Result<Item> {
        let field = BitField::parse(local_path)?;
        let array = match field.end {
            Some(end) => self.read_bounded(field, end)?,
            None => self.read_tail(field)?,
        };
        Ok(Item::from_array(array).with_attrs(self.native_attrs()))
    }

    fn item_keys(&self) -> Vec<String> {
        // the record stream is not an enumerable container
        Vec::new()
    }
}

fn index_records(buffer: &[u8], framing: &Framing) -> Result<Vec<(usize, usize)>> {
    let mut records = Vec::new();
    let mut k = 0usize;
    while k < buffer.len() {
        let length = match *framing {
            Framing::Fixed { record_length } => record_length,
            Framing::Prefixed { offset, size, adjust } => {
                if k + offset + size > buffer.len() {
                    return Err(AccessorError::Format(format!(
                        "truncated record header at byte {k}"
                    )));
                }
                let mut value: u64 = 0;
                for &b in &buffer[k + offset..k + offset + size] {
                    value = (value << 8) | b as u64;
                }
                let total = value as i64 + adjust;
                if total <= 0 {
                    return Err(AccessorError::Format(format!(
                        "non-positive record length at byte {k}"
                    )));
                }
                total as usize
            }
        };
        if k + length > buffer.len() {
            return Err(AccessorError::Format(format!(
                "record at byte {k} overruns the stream ({length} bytes declared, {} left)",
                buffer.len() - k
            )));
        }
        records.push((k, length));
        k += length;
    }
    Ok(records)
}

/// Extract `width` bits starting at `bit` from a big-endian record.
fn extract_bits(record: &[u8], bit: u64, width: u64) -> u64 {
    let start_byte = (bit / 8) as usize;
    let end_byte = ((bit + width - 1) / 8 + 1) as usize;
    let mut acc: u128 = 0;
    for &b in &record[start_byte..end_byte] {
        acc = (acc << 8) | b as u128;
    }
    let shift = (end_byte as u64) * 8 - (bit + width);
    let mask: u128 = if width == 64 { u64::MAX as u128 } else { (1u128 << width) - 1 };
    ((acc >> shift) & mask) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(data).unwrap();
        f
    }

    fn fixed_config(record_length: u64) -> AccessorConfig {
        let mut config = AccessorConfig::new();
        config.insert("record_length".into(), json!(record_length));
        config
    }

    #[test]
    fn three_bit_field_over_fixed_records() {
        // four 2-byte records; top 3 bits are 5, 3, 0, 7
        let data = [0b1010_0001u8, 0x00, 0b0110_0000, 0x00, 0b0001_1111, 0x00, 0b1110_0000, 0x00];
        let f = write_temp(&data);
        let accessor = BinaryAccessor::open(f.path(), &fixed_config(2)).unwrap();
        assert_eq!(accessor.record_count(), 4);

        let item = accessor.read_item("0:3:3").unwrap();
        let array = item.array.unwrap();
        assert_eq!(array.shape(), &[4]);
        assert_eq!(array.values(), &ArrayValues::UInt64(vec![5, 3, 0, 7]));
    }

    #[test]
    fn field_spanning_byte_boundary() {
        // bits 4..16 of [0xAB, 0xCD] = 0xBCD
        let f = write_temp(&[0xAB, 0xCD]);
        let accessor = BinaryAccessor::open(f.path(), &fixed_config(2)).unwrap();
        let item = accessor.read_item("4:16:12").unwrap();
        assert_eq!(item.array.unwrap().values(), &ArrayValues::UInt64(vec![0xBCD]));
    }

    #[test]
    fn multi_element_field_yields_two_dims() {
        // one 2-byte record read as four 4-bit nibbles
        let f = write_temp(&[0x12, 0x34]);
        let accessor = BinaryAccessor::open(f.path(), &fixed_config(2)).unwrap();
        let item = accessor.read_item("0:16:4").unwrap();
        let array = item.array.unwrap();
        assert_eq!(array.shape(), &[1, 4]);
        assert_eq!(array.values(), &ArrayValues::UInt64(vec![1, 2, 3, 4]));
    }

    #[test]
    fn length_prefixed_records_and_tail_field() {
        // records: [len=3, a, b], [len=4, c, d, e]; length field counts
        // the payload plus itself
        let data = [3u8, 0xAA, 0xBB, 4, 0xCC, 0xDD, 0xEE];
        let f = write_temp(&data);
        let mut config = AccessorConfig::new();
        config.insert("length_field_offset".into(), json!(0));
        config.insert("length_field_size".into(), json!(1));
        let accessor = BinaryAccessor::open(f.path(), &config).unwrap();
        assert_eq!(accessor.record_count(), 2);

        // tail from byte 1 onward, zero-padded to the longest tail
        let item = accessor.read_item("8::8").unwrap();
        let array = item.array.unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(
            array.values(),
            &ArrayValues::UInt64(vec![0xAA, 0xBB, 0x00, 0xCC, 0xDD, 0xEE])
        );
    }

    #[test]
    fn overrunning_record_is_a_format_error() {
        let f = write_temp(&[1, 2, 3]);
        let err = BinaryAccessor::open(f.path(), &fixed_config(2));
        assert!(matches!(err, Err(AccessorError::Format(_))));
    }

    #[test]
    fn malformed_key_is_a_format_error() {
        let f = write_temp(&[0, 0]);
        let accessor = BinaryAccessor::open(f.path(), &fixed_config(2)).unwrap();
        assert!(accessor.read_item("0:3").is_err());
        assert!(accessor.read_item("3:0:3").is_err());
        assert!(accessor.read_item("0:7:3").is_err());
    }
}
