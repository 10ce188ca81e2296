//! GRIB message accessor.
//!
//! Auxiliary meteorological annexes ship as GRIB files with one data
//! field per submessage. All submessages are decoded once at open;
//! reads afterwards only index the decoded buffers. Items are keyed
//! `<message>.<submessage>` as the container numbers them, with the
//! plain decode position accepted as a shorthand.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::json;

use eo_common::{ArrayValues, Attributes, NdArray};

use crate::error::{AccessorError, Result};
use crate::registry::AccessorConfig;
use crate::{FormatAccessor, Item};

struct Field {
    key: String,
    values: Vec<f32>,
    attrs: Attributes,
}

/// Accessor over the decoded fields of one GRIB file.
pub struct GribAccessor {
    fields: Vec<Field>,
    /// Declared field shape; decoded buffers stay 1-D without it.
    shape: Option<Vec<usize>>,
}

impl GribAccessor {
    /// Parse and decode every submessage. The file handle is released
    /// before this returns.
    pub fn open(path: &Path, config: &AccessorConfig) -> Result<Self> {
        let shape = match config.get("shape") {
            None => None,
            Some(value) => Some(
                value
                    .as_array()
                    .and_then(|extents| {
                        extents
                            .iter()
                            .map(|e| e.as_u64().map(|e| e as usize))
                            .collect::<Option<Vec<usize>>>()
                    })
                    .ok_or_else(|| {
                        AccessorError::MissingConfig("'shape' must be an array of extents".into())
                    })?,
            ),
        };

        let reader = BufReader::new(File::open(path)?);
        let container = grib::from_reader(reader)
            .map_err(|err| AccessorError::Format(format!("GRIB parse error: {err:?}")))?;

        let mut fields = Vec::new();
        for ((message, submessage), submsg) in container.iter() {
            let mut attrs = Attributes::new();
            attrs.insert(
                "discipline".into(),
                json!(format!("{:?}", submsg.indicator().discipline)),
            );
            attrs.insert("grid_template".into(), json!(submsg.grid_def().grid_tmpl_num()));
            attrs.insert("product_template".into(), json!(submsg.prod_def().prod_tmpl_num()));

            let decoder = grib::Grib2SubmessageDecoder::from(submsg)
                .map_err(|err| AccessorError::Format(format!("GRIB decode error: {err}")))?;
            let values: Vec<f32> = decoder
                .dispatch()
                .map_err(|err| AccessorError::Format(format!("GRIB decode error: {err}")))?
                .collect();

            fields.push(Field { key: format!("{message}.{submessage}"), values, attrs });
        }
        Ok(Self { fields, shape })
    }

    fn field(&self, local_path: &str) -> Result<&Field> {
        if let Some(field) = self.fields.iter().find(|f| f.key == local_path) {
            return Ok(field);
        }
        if let Ok(position) = local_path.parse::<usize>() {
            if let Some(field) = self.fields.get(position) {
                return Ok(field);
            }
        }
        Err(AccessorError::KeyNotFound(local_path.to_string()))
    }
}

impl FormatAccessor for GribAccessor {
    fn read_item(&self, local_path: &str) -> Result<Item> {
        let field = self.field(local_path)?;
        let shape = match &self.shape {
            Some(shape) => shape.clone(),
            None => vec![field.values.len()],
        };
        let array = NdArray::new(shape, ArrayValues::Float32(field.values.clone()))?;
        Ok(Item::from_array(array).with_attrs(field.attrs.clone()))
    }

    fn item_keys(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.key.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn garbage_bytes_are_a_format_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"this is not a grib file").unwrap();
        let err = GribAccessor::open(f.path(), &AccessorConfig::new());
        assert!(matches!(err, Err(AccessorError::Format(_))));
    }

    #[test]
    fn bad_shape_configuration_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"GRIB").unwrap();
        let mut config = AccessorConfig::new();
        config.insert("shape".into(), json!("721x1440"));
        let err = GribAccessor::open(f.path(), &config);
        assert!(matches!(err, Err(AccessorError::MissingConfig(_))));
    }
}
