//! Angle grids and tie-point axes reconstructed from tile metadata.
//!
//! Sun and viewing angles live in the tile XML as `VALUES` row lists:
//! each row element holds one whitespace-separated line of the grid.
//! A path matching the rows of a single grid yields a 2-D array; a
//! path matching several per-band/per-detector grid containers yields
//! a 4-D `(bands, detectors, y, x)` array, absent combinations padded
//! with zeros.
//!
//! Tie-point axes are not stored at all: they are synthesized from an
//! upper-left reference coordinate, a constant step, and the shape of
//! the angle grid the axis belongs to.

use std::collections::BTreeMap;
use std::path::Path;

use eo_common::{ArrayValues, NdArray};

use crate::error::{AccessorError, Result};
use crate::registry::AccessorConfig;
use crate::xml::dom::XmlElement;
use crate::xml::xpath::LocationPath;
use crate::xml::{namespaces_from_config, select_strings};
use crate::{FormatAccessor, Item};

pub const DIM_Y: &str = "y_tiepoints";
pub const DIM_X: &str = "x_tiepoints";
pub const DIM_BANDS: &str = "bands";
pub const DIM_DETECTORS: &str = "detectors";

const ROW_ELEMENT: &str = "VALUES";

/// One rectangular grid parsed from `VALUES` rows.
struct Grid {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

fn parse_rows(rows: &[&XmlElement]) -> Result<Grid> {
    let mut values = Vec::new();
    let mut cols = None;
    for row in rows {
        let line: Vec<f64> = row
            .trimmed_text()
            .split_whitespace()
            .map(|cell| {
                cell.parse::<f64>()
                    .map_err(|_| AccessorError::Format(format!("non-numeric grid cell '{cell}'")))
            })
            .collect::<Result<_>>()?;
        match cols {
            None => cols = Some(line.len()),
            Some(cols) if cols != line.len() => {
                return Err(AccessorError::Format(format!(
                    "ragged grid: row of {} cells in a {cols}-column grid",
                    line.len()
                )));
            }
            Some(_) => {}
        }
        values.extend(line);
    }
    Ok(Grid { rows: rows.len(), cols: cols.unwrap_or(0), values })
}

fn grid_rows<'a>(container: &'a XmlElement) -> Vec<&'a XmlElement> {
    container
        .descendants()
        .into_iter()
        .filter(|node| node.name == ROW_ELEMENT)
        .collect()
}

fn index_attr(node: &XmlElement, attr: &str) -> Result<usize> {
    match node.attr(attr) {
        None => Ok(0),
        Some(value) => value.parse::<usize>().map_err(|_| {
            AccessorError::Format(format!("attribute {attr}='{value}' is not an index"))
        }),
    }
}

/// Accessor reconstructing angle grids from `VALUES` row lists.
pub struct XmlAnglesAccessor {
    root: XmlElement,
    namespaces: BTreeMap<String, String>,
}

impl XmlAnglesAccessor {
    pub fn open(path: &Path, config: &AccessorConfig) -> Result<Self> {
        let namespaces = namespaces_from_config(config)?;
        let text = std::fs::read_to_string(path)?;
        let root = crate::xml::dom::parse(&text)?;
        Ok(Self { root, namespaces })
    }

    fn fuse_containers(&self, containers: &[&XmlElement]) -> Result<(NdArray, Vec<String>)> {
        let mut grids = Vec::with_capacity(containers.len());
        let mut bands = Vec::new();
        let mut detectors = Vec::new();
        for container in containers {
            let rows = grid_rows(container);
            if rows.is_empty() {
                return Err(AccessorError::Format(format!(
                    "element '{}' contains no {ROW_ELEMENT} rows",
                    container.name
                )));
            }
            let band = index_attr(container, "bandId")?;
            let detector = index_attr(container, "detectorId")?;
            bands.push(band);
            detectors.push(detector);
            grids.push((band, detector, parse_rows(&rows)?));
        }

        let (rows, cols) = (grids[0].2.rows, grids[0].2.cols);
        if grids.iter().any(|(_, _, g)| g.rows != rows || g.cols != cols) {
            return Err(AccessorError::Format(
                "angle grids selected together have differing shapes".into(),
            ));
        }

        bands.sort_unstable();
        bands.dedup();
        detectors.sort_unstable();
        detectors.dedup();
        let band_index = |id: usize| bands.iter().position(|&b| b == id).unwrap_or(0);
        let detector_index = |id: usize| detectors.iter().position(|&d| d == id).unwrap_or(0);

        let shape = vec![bands.len(), detectors.len(), rows, cols];
        let mut values = vec![0.0f64; shape.iter().product()];
        let plane = rows * cols;
        for (band, detector, grid) in grids {
            let base = (band_index(band) * detectors.len() + detector_index(detector)) * plane;
            values[base..base + plane].copy_from_slice(&grid.values);
        }
        let dims = vec![
            DIM_BANDS.to_string(),
            DIM_DETECTORS.to_string(),
            DIM_Y.to_string(),
            DIM_X.to_string(),
        ];
        Ok((NdArray::new(shape, ArrayValues::Float64(values))?, dims))
    }
}

impl FormatAccessor for XmlAnglesAccessor {
    fn read_item(&self, local_path: &str) -> Result<Item> {
        let location = LocationPath::parse(local_path)?;
        let nodes = location.select(&self.root, &self.namespaces)?;
        if nodes.is_empty() {
            return Err(AccessorError::KeyNotFound(local_path.to_string()));
        }

        // the path either names the rows themselves or per-band grid
        // containers holding them
        let (array, dims) = if nodes.iter().all(|node| node.name == ROW_ELEMENT) {
            let grid = parse_rows(&nodes)?;
            (
                NdArray::new(vec![grid.rows, grid.cols], ArrayValues::Float64(grid.values))?,
                vec![DIM_Y.to_string(), DIM_X.to_string()],
            )
        } else if nodes.len() == 1 {
            let rows = grid_rows(nodes[0]);
            if rows.is_empty() {
                return Err(AccessorError::KeyNotFound(local_path.to_string()));
            }
            let grid = parse_rows(&rows)?;
            (
                NdArray::new(vec![grid.rows, grid.cols], ArrayValues::Float64(grid.values))?,
                vec![DIM_Y.to_string(), DIM_X.to_string()],
            )
        } else {
            self.fuse_containers(&nodes)?
        };
        Ok(Item::from_array(array).with_dims(dims))
    }

    fn item_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Accessor synthesizing tie-point coordinate axes.
///
/// Configuration: `step_path` locates the grid step in metres,
/// `values_path` locates the `VALUES` rows whose shape fixes the axis
/// length. The item key locates the upper-left reference coordinate;
/// its last letter (`Y` or `X`) picks the axis. Y descends from the
/// reference, X ascends, both offset to cell centres.
pub struct XmlTiePointAccessor {
    root: XmlElement,
    namespaces: BTreeMap<String, String>,
    step: f64,
    grid_rows: usize,
    grid_cols: usize,
}

impl XmlTiePointAccessor {
    pub fn open(path: &Path, config: &AccessorConfig) -> Result<Self> {
        let namespaces = namespaces_from_config(config)?;
        let step_path = config
            .get("step_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AccessorError::MissingConfig("step_path".into()))?;
        let values_path = config
            .get("values_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AccessorError::MissingConfig("values_path".into()))?;

        let text = std::fs::read_to_string(path)?;
        let root = crate::xml::dom::parse(&text)?;

        let step_text = select_strings(&root, &namespaces, step_path)?;
        let step: f64 = step_text[0]
            .parse()
            .map_err(|_| AccessorError::Format(format!("non-numeric step '{}'", step_text[0])))?;

        let location = LocationPath::parse(values_path)?;
        let rows: Vec<&XmlElement> = location
            .select(&root, &namespaces)?
            .into_iter()
            .filter(|node| node.name == ROW_ELEMENT)
            .collect();
        if rows.is_empty() {
            return Err(AccessorError::KeyNotFound(values_path.to_string()));
        }
        let grid = parse_rows(&rows)?;

        Ok(Self { root, namespaces, step, grid_rows: grid.rows, grid_cols: grid.cols })
    }
}

impl FormatAccessor for XmlTiePointAccessor {
    fn read_item(&self, local_path: &str) -> Result<Item> {
        let reference_text = select_strings(&self.root, &self.namespaces, local_path)?;
        let reference: f64 = reference_text[0].parse().map_err(|_| {
            AccessorError::Format(format!("non-numeric reference '{}'", reference_text[0]))
        })?;

        let axis = local_path
            .trim_end()
            .chars()
            .next_back()
            .map(|c| c.to_ascii_uppercase());
        let (len, dim, sign) = match axis {
            Some('Y') => (self.grid_rows, DIM_Y, -1.0),
            Some('X') => (self.grid_cols, DIM_X, 1.0),
            _ => {
                return Err(AccessorError::Format(format!(
                    "tie-point key must end in Y or X: '{local_path}'"
                )));
            }
        };
        let half = self.step / 2.0;
        let values: Vec<f64> = (0..len)
            .map(|i| reference + sign * (i as f64 * self.step + half))
            .collect();
        Ok(Item::from_array(NdArray::from_f64(values)).with_dims(vec![dim.to_string()]))
    }

    fn item_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const TILE: &str = r#"<n1:Tile xmlns:n1="http://example.com/tile">
  <Geometric_Info>
    <Tile_Geocoding>
      <Geoposition><ULX>300000</ULX><ULY>5000040</ULY></Geoposition>
    </Tile_Geocoding>
    <Tile_Angles>
      <Sun_Angles_Grid>
        <Zenith>
          <COL_STEP>5000</COL_STEP>
          <Values_List>
            <VALUES>1.0 2.0 3.0</VALUES>
            <VALUES>4.0 5.0 6.0</VALUES>
          </Values_List>
        </Zenith>
      </Sun_Angles_Grid>
      <Viewing_Incidence_Angles_Grids bandId="0" detectorId="2">
        <Zenith><Values_List>
          <VALUES>1.0 1.0</VALUES>
        </Values_List></Zenith>
      </Viewing_Incidence_Angles_Grids>
      <Viewing_Incidence_Angles_Grids bandId="1" detectorId="3">
        <Zenith><Values_List>
          <VALUES>2.0 2.0</VALUES>
        </Values_List></Zenith>
      </Viewing_Incidence_Angles_Grids>
    </Tile_Angles>
  </Geometric_Info>
</n1:Tile>"#;

    fn config() -> AccessorConfig {
        let mut config = AccessorConfig::new();
        config.insert("namespace".into(), json!({"n1": "http://example.com/tile"}));
        config
    }

    fn write_tile() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(TILE.as_bytes()).unwrap();
        f
    }

    #[test]
    fn sun_angle_rows_become_a_grid() {
        let f = write_tile();
        let accessor = XmlAnglesAccessor::open(f.path(), &config()).unwrap();
        let item = accessor
            .read_item("n1:Tile//Sun_Angles_Grid/Zenith/Values_List/VALUES")
            .unwrap();
        let array = item.array.unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(item.dims, [DIM_Y, DIM_X]);
        assert_eq!(
            array.values(),
            &ArrayValues::Float64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        );
    }

    #[test]
    fn per_band_grids_fuse_into_four_dims() {
        let f = write_tile();
        let accessor = XmlAnglesAccessor::open(f.path(), &config()).unwrap();
        let item = accessor
            .read_item("n1:Tile//Viewing_Incidence_Angles_Grids")
            .unwrap();
        let array = item.array.unwrap();
        assert_eq!(array.shape(), &[2, 2, 1, 2]);
        assert_eq!(item.dims, [DIM_BANDS, DIM_DETECTORS, DIM_Y, DIM_X]);
        // band 0 sits in detector slot 0, band 1 in slot 1; the two
        // off-diagonal combinations are zero padding
        assert_eq!(
            array.values(),
            &ArrayValues::Float64(vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 2.0, 2.0])
        );
    }

    #[test]
    fn tie_point_axes_descend_and_ascend_from_the_corner() {
        let f = write_tile();
        let mut config = config();
        config.insert("step_path".into(), json!("n1:Tile//Sun_Angles_Grid/Zenith/COL_STEP"));
        config.insert(
            "values_path".into(),
            json!("n1:Tile//Sun_Angles_Grid/Zenith/Values_List/VALUES"),
        );
        let accessor = XmlTiePointAccessor::open(f.path(), &config).unwrap();

        let y = accessor.read_item("n1:Tile//Geoposition/ULY").unwrap();
        assert_eq!(y.dims, [DIM_Y]);
        assert_eq!(
            y.array.unwrap().values(),
            &ArrayValues::Float64(vec![5000040.0 - 2500.0, 5000040.0 - 7500.0])
        );

        let x = accessor.read_item("n1:Tile//Geoposition/ULX").unwrap();
        assert_eq!(x.dims, [DIM_X]);
        assert_eq!(
            x.array.unwrap().values(),
            &ArrayValues::Float64(vec![302500.0, 307500.0, 312500.0])
        );
    }
}
