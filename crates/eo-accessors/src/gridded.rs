//! Gridded-container accessor.
//!
//! Some legacy annexes already arrive as chunked array containers.
//! Rather than a separate decoder, this accessor opens the container
//! read-only through the store layer and exposes every variable as an
//! item, keyed by its path inside the container.

use std::path::Path;

use eo_common::path as tree_path;
use eo_store::{EntryKind, OpenMode, ProductStore, ZarrStore};

use crate::error::Result;
use crate::registry::AccessorConfig;
use crate::{FormatAccessor, Item};

pub struct GriddedAccessor {
    store: ZarrStore,
}

impl GriddedAccessor {
    pub fn open(path: &Path, _config: &AccessorConfig) -> Result<Self> {
        let mut store = ZarrStore::new(path);
        store.open(OpenMode::ReadOnly)?;
        Ok(Self { store })
    }

    fn collect_keys(&self, prefix: &str, keys: &mut Vec<String>) -> Result<()> {
        for entry in self.store.listdir(prefix)? {
            let child = tree_path::join(&[prefix, &entry.name]);
            match entry.kind {
                EntryKind::Variable => keys.push(child),
                EntryKind::Group => self.collect_keys(&child, keys)?,
            }
        }
        Ok(())
    }
}

impl FormatAccessor for GriddedAccessor {
    fn read_item(&self, local_path: &str) -> Result<Item> {
        if self.store.is_variable(local_path)? {
            let stored = self.store.read_variable(local_path)?;
            Ok(Item::from_array(stored.array)
                .with_dims(stored.dims)
                .with_attrs(stored.attrs))
        } else {
            Ok(Item::attrs_only(self.store.read_attrs(local_path)?))
        }
    }

    fn item_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if self.collect_keys("", &mut keys).is_err() {
            return Vec::new();
        }
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eo_common::{ArrayValues, Attributes, NdArray};
    use serde_json::json;

    fn seeded_container(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("annex.zarr");
        let mut store = ZarrStore::new(&path);
        store.open(OpenMode::NewProduct).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("units".into(), json!("K"));
        store
            .write_variable(
                "fields/bt",
                &NdArray::new(vec![2, 2], ArrayValues::Float64(vec![1.0, 2.0, 3.0, 4.0])).unwrap(),
                &["y".to_string(), "x".to_string()],
                &attrs,
            )
            .unwrap();
        store.close().unwrap();
        path
    }

    #[test]
    fn container_variables_are_enumerable_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_container(&dir);
        let accessor = GriddedAccessor::open(&path, &AccessorConfig::new()).unwrap();
        assert_eq!(accessor.item_keys(), ["fields/bt"]);

        let item = accessor.read_item("fields/bt").unwrap();
        assert_eq!(item.dims, ["y", "x"]);
        assert_eq!(item.attrs.get("units"), Some(&json!("K")));
        assert_eq!(item.array.unwrap().shape(), &[2, 2]);
    }

    #[test]
    fn missing_container_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.zarr");
        assert!(GriddedAccessor::open(&missing, &AccessorConfig::new()).is_err());
    }
}
