//! Zarr V3 filesystem store.
//!
//! Persists the harmonized tree as a Zarr hierarchy: one Zarr group per
//! tree group, one Zarr array per variable. Dimension names travel in
//! the `_ARRAY_DIMENSIONS` attribute so they survive the round trip;
//! scalars are stored as one-element arrays with a marker attribute and
//! restored to rank 0 on read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use zarrs::array::{Array, ArrayBuilder, ChunkGrid, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use eo_common::{merge_attrs, path, ArrayValues, Attributes, NdArray};

use crate::error::{Result, StoreError};
use crate::{EntryKind, OpenMode, ProductStore, StoreEntry, StoredVariable};

/// Attribute carrying the dimension-name tuple of an array.
const DIMS_ATTR: &str = "_ARRAY_DIMENSIONS";
/// Marker attribute flagging a rank-0 value stored as shape `[1]`.
const SCALAR_ATTR: &str = "_scalar";

/// Filesystem-backed Zarr V3 [`ProductStore`].
pub struct ZarrStore {
    root: PathBuf,
    mode: Option<OpenMode>,
}

impl ZarrStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), mode: None }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn require_open(&self) -> Result<OpenMode> {
        self.mode.ok_or(StoreError::NotOpen)
    }

    fn require_writable(&self) -> Result<()> {
        if !self.require_open()?.is_writable() {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn storage(&self) -> Result<Arc<FilesystemStore>> {
        FilesystemStore::new(&self.root)
            .map(Arc::new)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Zarr node path (`/a/b`) for a normalized tree path.
    fn node_path(tree_path: &str) -> String {
        let norm = path::normalize(tree_path);
        if norm.is_empty() {
            "/".to_string()
        } else {
            format!("/{norm}")
        }
    }

    fn has_node(&self, tree_path: &str) -> bool {
        let norm = path::normalize(tree_path);
        self.root.join(norm).join("zarr.json").is_file()
    }

    /// Store group metadata at every missing ancestor of `tree_path`
    /// (not including `tree_path` itself).
    fn ensure_parent_groups(&self, storage: &Arc<FilesystemStore>, tree_path: &str) -> Result<()> {
        let segs = path::segments(tree_path);
        let mut cur = String::new();
        // the root group plus each intermediate segment
        for i in 0..segs.len() {
            if i > 0 {
                cur = path::join(&[&cur, segs[i - 1]]);
            }
            if !self.has_node(&cur) {
                self.write_group_metadata(storage, &cur, &Attributes::new())?;
            }
        }
        Ok(())
    }

    fn write_group_metadata(
        &self,
        storage: &Arc<FilesystemStore>,
        tree_path: &str,
        attrs: &Attributes,
    ) -> Result<()> {
        let group = GroupBuilder::new()
            .attributes(attrs.clone())
            .build(storage.clone(), &Self::node_path(tree_path))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        group
            .store_metadata()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn open_group(&self, tree_path: &str) -> Result<Group<FilesystemStore>> {
        let storage = self.storage()?;
        Group::open(storage, &Self::node_path(tree_path))
            .map_err(|_| StoreError::KeyNotFound(path::normalize(tree_path)))
    }
}

fn chunk_grid_for(shape: &[u64]) -> Result<ChunkGrid> {
    // whole-array chunks; persisted products are written once
    let chunks: Vec<u64> = shape.iter().map(|&s| s.max(1)).collect();
    chunks
        .try_into()
        .map_err(|e| StoreError::Backend(format!("invalid chunk shape: {e:?}")))
}

impl ProductStore for ZarrStore {
    fn open(&mut self, mode: OpenMode) -> Result<()> {
        match mode {
            OpenMode::NewProduct => {
                if self.root.join("zarr.json").exists() {
                    return Err(StoreError::Backend(format!(
                        "target already holds a product: {}",
                        self.root.display()
                    )));
                }
                std::fs::create_dir_all(&self.root)?;
                self.mode = Some(mode);
                let storage = self.storage()?;
                self.write_group_metadata(&storage, "", &Attributes::new())?;
            }
            OpenMode::ReadOnly | OpenMode::InPlace => {
                if !self.root.is_dir() {
                    return Err(StoreError::Backend(format!(
                        "no product at {}",
                        self.root.display()
                    )));
                }
                self.mode = Some(mode);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.require_open()?;
        self.mode = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    fn mode(&self) -> Option<OpenMode> {
        self.mode
    }

    fn write_variable(
        &mut self,
        tree_path: &str,
        array: &NdArray,
        dims: &[String],
        attrs: &Attributes,
    ) -> Result<()> {
        self.require_writable()?;
        let norm = path::normalize(tree_path);
        if norm.is_empty() {
            return Err(StoreError::Unsupported("cannot write a variable at the root".into()));
        }

        let storage = self.storage()?;
        self.ensure_parent_groups(&storage, &norm)?;

        let scalar = array.rank() == 0;
        let shape: Vec<u64> = if scalar {
            vec![1]
        } else {
            array.shape().iter().map(|&s| s as u64).collect()
        };

        let mut stored_attrs = attrs.clone();
        stored_attrs.insert(DIMS_ATTR.to_string(), json!(dims));
        if scalar {
            stored_attrs.insert(SCALAR_ATTR.to_string(), json!(true));
        }

        let (data_type, fill_value) = match array.values() {
            ArrayValues::UInt64(_) => (DataType::UInt64, FillValue::from(0u64)),
            ArrayValues::Int64(_) => (DataType::Int64, FillValue::from(0i64)),
            ArrayValues::Float32(_) => (DataType::Float32, FillValue::from(f32::NAN)),
            ArrayValues::Float64(_) => (DataType::Float64, FillValue::from(f64::NAN)),
            ArrayValues::Text(_) => {
                return Err(StoreError::Unsupported(
                    "string arrays are not persisted; carry strings as attributes".into(),
                ))
            }
        };

        let zarr_array = ArrayBuilder::new(shape.clone(), data_type, chunk_grid_for(&shape)?, fill_value)
            .attributes(stored_attrs)
            .build(storage, &Self::node_path(&norm))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        zarr_array
            .store_metadata()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if array.is_empty() {
            return Ok(());
        }
        let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let write = match array.values() {
            ArrayValues::UInt64(d) => zarr_array.store_array_subset_elements(&subset, d),
            ArrayValues::Int64(d) => zarr_array.store_array_subset_elements(&subset, d),
            ArrayValues::Float32(d) => zarr_array.store_array_subset_elements(&subset, d),
            ArrayValues::Float64(d) => zarr_array.store_array_subset_elements(&subset, d),
            ArrayValues::Text(_) => unreachable!("rejected above"),
        };
        write.map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn read_variable(&self, tree_path: &str) -> Result<StoredVariable> {
        self.require_open()?;
        let norm = path::normalize(tree_path);
        if !self.has_node(&norm) {
            return Err(StoreError::KeyNotFound(norm));
        }
        let storage = self.storage()?;
        let zarr_array = Array::open(storage, &Self::node_path(&norm))
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let shape: Vec<u64> = zarr_array.shape().to_vec();
        let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape.clone())
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let values = match zarr_array.data_type() {
            DataType::UInt64 => ArrayValues::UInt64(
                zarr_array
                    .retrieve_array_subset_elements(&subset)
                    .map_err(|e| StoreError::Backend(e.to_string()))?,
            ),
            DataType::Int64 => ArrayValues::Int64(
                zarr_array
                    .retrieve_array_subset_elements(&subset)
                    .map_err(|e| StoreError::Backend(e.to_string()))?,
            ),
            DataType::Float32 => ArrayValues::Float32(
                zarr_array
                    .retrieve_array_subset_elements(&subset)
                    .map_err(|e| StoreError::Backend(e.to_string()))?,
            ),
            DataType::Float64 => ArrayValues::Float64(
                zarr_array
                    .retrieve_array_subset_elements(&subset)
                    .map_err(|e| StoreError::Backend(e.to_string()))?,
            ),
            other => {
                return Err(StoreError::Unsupported(format!(
                    "unsupported stored data type: {other}"
                )))
            }
        };

        let mut attrs: Attributes = zarr_array.attributes().clone();
        let dims: Vec<String> = attrs
            .remove(DIMS_ATTR)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let scalar = attrs
            .remove(SCALAR_ATTR)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let usize_shape: Vec<usize> = if scalar {
            Vec::new()
        } else {
            shape.iter().map(|&s| s as usize).collect()
        };
        let array = NdArray::new(usize_shape, values)?;
        Ok(StoredVariable { array, dims, attrs })
    }

    fn write_attrs(&mut self, tree_path: &str, attrs: &Attributes) -> Result<()> {
        self.require_writable()?;
        let norm = path::normalize(tree_path);
        if self.is_variable(&norm)? {
            return Err(StoreError::Unsupported(format!(
                "'{norm}' is a variable; group attributes cannot replace its metadata"
            )));
        }
        let storage = self.storage()?;
        self.ensure_parent_groups(&storage, &norm)?;
        let mut merged = match self.open_group(&norm) {
            Ok(group) => group.attributes().clone(),
            Err(_) => Attributes::new(),
        };
        merge_attrs(&mut merged, attrs);
        self.write_group_metadata(&storage, &norm, &merged)
    }

    fn read_attrs(&self, tree_path: &str) -> Result<Attributes> {
        self.require_open()?;
        Ok(self.open_group(tree_path)?.attributes().clone())
    }

    fn listdir(&self, tree_path: &str) -> Result<Vec<StoreEntry>> {
        self.require_open()?;
        let norm = path::normalize(tree_path);
        let dir = self.root.join(&norm);
        if !dir.is_dir() {
            return Err(StoreError::KeyNotFound(norm));
        }
        let mut entries = Vec::new();
        let mut children: Vec<_> = std::fs::read_dir(&dir)?
            .collect::<std::io::Result<Vec<_>>>()?;
        children.sort_by_key(|e| e.file_name());
        for child in children {
            if !child.file_type()?.is_dir() {
                continue;
            }
            let meta = child.path().join("zarr.json");
            if !meta.is_file() {
                continue;
            }
            let doc: Value = serde_json::from_slice(&std::fs::read(&meta)?)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let kind = match doc.get("node_type").and_then(Value::as_str) {
                Some("array") => EntryKind::Variable,
                _ => EntryKind::Group,
            };
            entries.push(StoreEntry { name: child.file_name().to_string_lossy().into_owned(), kind });
        }
        Ok(entries)
    }

    fn is_variable(&self, tree_path: &str) -> Result<bool> {
        self.require_open()?;
        let norm = path::normalize(tree_path);
        let meta = self.root.join(&norm).join("zarr.json");
        if !meta.is_file() {
            return Ok(false);
        }
        let doc: Value = serde_json::from_slice(&std::fs::read(&meta)?)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(doc.get("node_type").and_then(Value::as_str) == Some("array"))
    }
}
