//! Raster imagery accessor.
//!
//! Band imagery (quicklooks, masks, preview rasters) is decoded
//! through the `image` crate into unsigned sample grids. Items:
//! `data` is the full raster (`[y, x]`, or `[band, y, x]` for
//! multi-channel images), `band_<n>` one channel, and `y`/`x` the
//! coordinate axes. Axes come from a declared GDAL-style geotransform
//! when the configuration carries one, pixel centre indices otherwise.

use std::path::Path;

use serde_json::json;

use eo_common::{ArrayValues, NdArray};

use crate::error::{AccessorError, Result};
use crate::registry::AccessorConfig;
use crate::{FormatAccessor, Item};

/// `[origin_x, pixel_width, row_rot, origin_y, col_rot, pixel_height]`
type GeoTransform = [f64; 6];

pub struct RasterAccessor {
    /// Samples in band-major order, `bands * height * width` long.
    samples: Vec<u64>,
    bands: usize,
    height: usize,
    width: usize,
    transform: Option<GeoTransform>,
}

impl RasterAccessor {
    /// Decode the whole image. The file handle is released before this
    /// returns.
    pub fn open(path: &Path, config: &AccessorConfig) -> Result<Self> {
        let transform = match config.get("transform") {
            None => None,
            Some(value) => {
                let coefficients: Vec<f64> = value
                    .as_array()
                    .and_then(|a| a.iter().map(|c| c.as_f64()).collect::<Option<Vec<f64>>>())
                    .ok_or_else(|| {
                        AccessorError::MissingConfig(
                            "'transform' must be six geotransform coefficients".into(),
                        )
                    })?;
                let coefficients: GeoTransform = coefficients.try_into().map_err(|_| {
                    AccessorError::MissingConfig(
                        "'transform' must be six geotransform coefficients".into(),
                    )
                })?;
                Some(coefficients)
            }
        };

        let img = image::open(path)
            .map_err(|err| AccessorError::Format(format!("image decode error: {err}")))?;
        let bands = img.color().channel_count() as usize;
        let (width, height) = (img.width() as usize, img.height() as usize);

        // widen everything to 16-bit RGBA once, then slice out the
        // channels the source really has
        let rgba = img.to_rgba16();
        let pixels = rgba.as_raw();
        let mut samples = vec![0u64; bands * height * width];
        for band in 0..bands {
            let plane = &mut samples[band * height * width..(band + 1) * height * width];
            for (idx, sample) in plane.iter_mut().enumerate() {
                *sample = pixels[idx * 4 + band] as u64;
            }
        }
        Ok(Self { samples, bands, height, width, transform })
    }

    fn band(&self, band: usize) -> Result<NdArray> {
        if band >= self.bands {
            return Err(AccessorError::KeyNotFound(format!("band_{band}")));
        }
        let plane = self.samples[band * self.height * self.width..(band + 1) * self.height * self.width]
            .to_vec();
        Ok(NdArray::new(vec![self.height, self.width], ArrayValues::UInt64(plane))?)
    }

    fn axis(&self, vertical: bool) -> NdArray {
        let len = if vertical { self.height } else { self.width };
        let values: Vec<f64> = match self.transform {
            Some(gt) => (0..len)
                .map(|i| {
                    let centre = i as f64 + 0.5;
                    if vertical {
                        gt[3] + centre * gt[5]
                    } else {
                        gt[0] + centre * gt[1]
                    }
                })
                .collect(),
            None => (0..len).map(|i| i as f64).collect(),
        };
        NdArray::from_f64(values)
    }
}

impl FormatAccessor for RasterAccessor {
    fn read_item(&self, local_path: &str) -> Result<Item> {
        match local_path {
            "data" => {
                if self.bands == 1 {
                    Ok(Item::from_array(self.band(0)?)
                        .with_dims(vec!["y".to_string(), "x".to_string()]))
                } else {
                    let array = NdArray::new(
                        vec![self.bands, self.height, self.width],
                        ArrayValues::UInt64(self.samples.clone()),
                    )?;
                    Ok(Item::from_array(array).with_dims(vec![
                        "band".to_string(),
                        "y".to_string(),
                        "x".to_string(),
                    ]))
                }
            }
            "y" => Ok(Item::from_array(self.axis(true)).with_dims(vec!["y".to_string()])),
            "x" => Ok(Item::from_array(self.axis(false)).with_dims(vec!["x".to_string()])),
            other => match other.strip_prefix("band_").and_then(|n| n.parse::<usize>().ok()) {
                Some(band) => Ok(Item::from_array(self.band(band)?)
                    .with_dims(vec!["y".to_string(), "x".to_string()])),
                None => Err(AccessorError::KeyNotFound(local_path.to_string())),
            },
        }
    }

    fn item_keys(&self) -> Vec<String> {
        let mut keys = vec!["data".to_string()];
        keys.extend((0..self.bands).map(|band| format!("band_{band}")));
        keys.push("y".to_string());
        keys.push("x".to_string());
        keys
    }
}
