//! In-memory product store.
//!
//! Backs unit tests and staging pipelines that assemble a product
//! before publishing it to a real target. Keys are normalized slash
//! paths; group attributes live in a parallel map.

use std::collections::BTreeMap;

use eo_common::{merge_attrs, path, Attributes, NdArray};

use crate::error::{Result, StoreError};
use crate::{EntryKind, OpenMode, ProductStore, StoreEntry, StoredVariable};

/// Map-backed [`ProductStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    mode: Option<OpenMode>,
    variables: BTreeMap<String, StoredVariable>,
    group_attrs: BTreeMap<String, Attributes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
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

    /// Group paths implied by the stored variables and explicit attrs.
    fn group_paths(&self) -> BTreeMap<String, ()> {
        let mut groups = BTreeMap::new();
        groups.insert(String::new(), ());
        for key in self.variables.keys().chain(self.group_attrs.keys()) {
            let mut segs = path::segments(key);
            if self.variables.contains_key(key) {
                segs.pop();
            }
            let mut cur = String::new();
            for seg in segs {
                cur = path::join(&[&cur, seg]);
                groups.insert(cur.clone(), ());
            }
        }
        groups
    }
}

impl ProductStore for MemoryStore {
    fn open(&mut self, mode: OpenMode) -> Result<()> {
        if mode == OpenMode::NewProduct {
            self.variables.clear();
            self.group_attrs.clear();
        }
        self.mode = Some(mode);
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
        path_: &str,
        array: &NdArray,
        dims: &[String],
        attrs: &Attributes,
    ) -> Result<()> {
        self.require_writable()?;
        let key = path::normalize(path_);
        if key.is_empty() {
            return Err(StoreError::Unsupported("cannot write a variable at the root".into()));
        }
        self.variables.insert(
            key,
            StoredVariable { array: array.clone(), dims: dims.to_vec(), attrs: attrs.clone() },
        );
        Ok(())
    }

    fn read_variable(&self, path_: &str) -> Result<StoredVariable> {
        self.require_open()?;
        let key = path::normalize(path_);
        self.variables
            .get(&key)
            .cloned()
            .ok_or(StoreError::KeyNotFound(key))
    }

    fn write_attrs(&mut self, path_: &str, attrs: &Attributes) -> Result<()> {
        self.require_writable()?;
        let key = path::normalize(path_);
        let entry = self.group_attrs.entry(key).or_default();
        merge_attrs(entry, attrs);
        Ok(())
    }

    fn read_attrs(&self, path_: &str) -> Result<Attributes> {
        self.require_open()?;
        let key = path::normalize(path_);
        if let Some(attrs) = self.group_attrs.get(&key) {
            return Ok(attrs.clone());
        }
        if self.group_paths().contains_key(&key) {
            return Ok(Attributes::new());
        }
        Err(StoreError::KeyNotFound(key))
    }

    fn listdir(&self, path_: &str) -> Result<Vec<StoreEntry>> {
        self.require_open()?;
        let key = path::normalize(path_);
        let groups = self.group_paths();
        if !groups.contains_key(&key) {
            return Err(StoreError::KeyNotFound(key));
        }
        let prefix = if key.is_empty() { String::new() } else { format!("{key}/") };
        let mut entries: Vec<StoreEntry> = Vec::new();
        let mut seen = BTreeMap::new();
        for group in groups.keys() {
            if let Some(rest) = group.strip_prefix(&prefix) {
                if rest.is_empty() || group == &key {
                    continue;
                }
                let name = rest.split('/').next().unwrap().to_string();
                seen.entry(name).or_insert(EntryKind::Group);
            }
        }
        for var in self.variables.keys() {
            if let Some(rest) = var.strip_prefix(&prefix) {
                if !rest.contains('/') {
                    seen.insert(rest.to_string(), EntryKind::Variable);
                }
            }
        }
        for (name, kind) in seen {
            entries.push(StoreEntry { name, kind });
        }
        Ok(entries)
    }

    fn is_variable(&self, path_: &str) -> Result<bool> {
        self.require_open()?;
        Ok(self.variables.contains_key(&path::normalize(path_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (NdArray, Vec<String>, Attributes) {
        let mut attrs = Attributes::new();
        attrs.insert("units".into(), json!("K"));
        (NdArray::from_f64(vec![1.0, 2.0, 3.0]), vec!["rows".to_string()], attrs)
    }

    #[test]
    fn roundtrip_preserves_dims_and_attrs() {
        let mut store = MemoryStore::new();
        store.open(OpenMode::NewProduct).unwrap();
        let (array, dims, attrs) = sample();
        store
            .write_variable("measurements/t", &array, &dims, &attrs)
            .unwrap();

        let back = store.read_variable("measurements/t").unwrap();
        assert_eq!(back.array, array);
        assert_eq!(back.dims, dims);
        assert_eq!(back.attrs, attrs);
    }

    #[test]
    fn closed_store_rejects_reads() {
        let mut store = MemoryStore::new();
        store.open(OpenMode::NewProduct).unwrap();
        let (array, dims, attrs) = sample();
        store.write_variable("measurements/t", &array, &dims, &attrs).unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.read_variable("measurements/t"),
            Err(StoreError::NotOpen)
        ));
    }

    #[test]
    fn readonly_rejects_writes() {
        let mut store = MemoryStore::new();
        store.open(OpenMode::ReadOnly).unwrap();
        let (array, dims, attrs) = sample();
        assert!(matches!(
            store.write_variable("measurements/t", &array, &dims, &attrs),
            Err(StoreError::ReadOnly)
        ));
    }

    #[test]
    fn listdir_reports_groups_and_variables() {
        let mut store = MemoryStore::new();
        store.open(OpenMode::NewProduct).unwrap();
        let (array, dims, attrs) = sample();
        store.write_variable("measurements/t", &array, &dims, &attrs).unwrap();
        store.write_attrs("coordinates", &Attributes::new()).unwrap();

        let entries = store.listdir("").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["coordinates", "measurements"]);

        let meas = store.listdir("measurements").unwrap();
        assert_eq!(meas, vec![StoreEntry { name: "t".into(), kind: EntryKind::Variable }]);
    }
}
