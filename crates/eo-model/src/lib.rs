//! Hierarchical data model for harmonized products.
//!
//! A [`Product`] owns a tree of [`Group`]s whose leaves are
//! [`Variable`]s: n-dimensional arrays plus dimension names and
//! attribute dictionaries. The tree is the uniform representation every
//! legacy format is mapped into.
//!
//! A product can be bound to a [`eo_store::ProductStore`] for
//! persistence: `write` pushes the tree out, `fetch_structure`/`load`
//! pull it back in (lazily, then materialized). A product is valid once
//! it contains the `measurements` and `coordinates` groups; this is
//! checked by [`Product::validate`], never enforced during
//! construction.

pub mod error;
pub mod group;
pub mod product;
pub mod variable;

pub use error::{ModelError, Result};
pub use group::Group;
pub use product::{NodeRef, Product, MANDATORY_GROUPS};
pub use variable::{Variable, VariableData};

#[cfg(test)]
mod tests {
    use super::*;
    use eo_common::{Attributes, NdArray};
    use eo_store::{MemoryStore, OpenMode, ProductStore};
    use serde_json::json;

    fn simple_product() -> Product {
        let mut product = Product::new("test_product");
        product
            .add_variable(
                "measurements/radiance",
                NdArray::from_f64(vec![1.0, 2.0, 3.0, 4.0]),
                vec!["columns".to_string()],
                Attributes::new(),
            )
            .unwrap();
        product
            .add_variable(
                "coordinates/columns",
                NdArray::from_u64(vec![0, 1, 2, 3]),
                vec!["columns".to_string()],
                Attributes::new(),
            )
            .unwrap();
        product
    }

    #[test]
    fn intermediate_groups_are_auto_created() {
        let mut product = Product::new("p");
        product.add_group("a/b/c").unwrap();
        assert!(product.contains("a"));
        assert!(product.contains("a/b"));
        assert!(product.contains("a/b/c"));
        // idempotent
        product.add_group("a/b/c").unwrap();
    }

    #[test]
    fn variable_at_root_is_invalid_structure() {
        let mut product = Product::new("p");
        let err = product.add_variable(
            "orphan",
            NdArray::from_u64(vec![1]),
            vec!["x".to_string()],
            Attributes::new(),
        );
        assert!(matches!(err, Err(ModelError::InvalidStructure(_))));
    }

    #[test]
    fn lookup_distinguishes_groups_and_variables() {
        let product = simple_product();
        assert!(matches!(product.get("measurements").unwrap(), NodeRef::Group(_)));
        assert!(matches!(
            product.get("measurements/radiance").unwrap(),
            NodeRef::Variable(_)
        ));
        assert!(matches!(
            product.get("measurements/missing"),
            Err(ModelError::KeyNotFound(_))
        ));
        // attribute-style spelling of the same path
        assert!(matches!(
            product.get("measurements.radiance").unwrap(),
            NodeRef::Variable(_)
        ));
    }

    #[test]
    fn validation_requires_mandatory_groups() {
        let mut product = Product::new("p");
        assert!(!product.is_valid());
        assert!(product.validate().is_err());
        product.add_group("measurements").unwrap();
        product.add_group("coordinates").unwrap();
        assert!(product.is_valid());
        product.validate().unwrap();
    }

    #[test]
    fn coordinates_resolved_by_dim_name() {
        let product = simple_product();
        let coords = product.coordinates_for("measurements/radiance").unwrap();
        assert_eq!(coords.len(), 1);
        assert_eq!(coords[0].name(), "columns");
    }

    #[test]
    fn write_load_roundtrip_through_memory_store() {
        let mut product = simple_product();
        product
            .attrs_mut()
            .insert("product_type".to_string(), json!("OL_1_EFR"));
        product
            .open(Box::new(MemoryStore::new()), OpenMode::NewProduct)
            .unwrap();
        product.write().unwrap();

        // reopen the same tree lazily, then materialize
        let mut restored = Product::new("restored");
        let mut store = MemoryStore::new();
        store.open(OpenMode::NewProduct).unwrap();
        // copy through the first store's contents
        let src = product.store().unwrap();
        for entry in src.listdir("measurements").unwrap() {
            let v = src.read_variable(&format!("measurements/{}", entry.name)).unwrap();
            store
                .write_variable(&format!("measurements/{}", entry.name), &v.array, &v.dims, &v.attrs)
                .unwrap();
        }
        for entry in src.listdir("coordinates").unwrap() {
            let v = src.read_variable(&format!("coordinates/{}", entry.name)).unwrap();
            store
                .write_variable(&format!("coordinates/{}", entry.name), &v.array, &v.dims, &v.attrs)
                .unwrap();
        }
        store.close().unwrap();
        restored.open(Box::new(store), OpenMode::ReadOnly).unwrap();
        restored.load().unwrap();
        assert!(restored.is_valid());
        let arr = restored.variable_array("measurements/radiance").unwrap();
        assert_eq!(arr.shape(), &[4]);
    }

    #[test]
    fn write_rejects_lazy_variables_missing_from_bound_store() {
        let mut store = MemoryStore::new();
        store.open(OpenMode::NewProduct).unwrap();
        store
            .write_variable(
                "measurements/t",
                &NdArray::from_f64(vec![1.0]),
                &["x".to_string()],
                &Attributes::new(),
            )
            .unwrap();

        let mut product = Product::new("p");
        product.open(Box::new(store), OpenMode::ReadOnly).unwrap();
        product.fetch_structure().unwrap();
        product.close().unwrap();

        // rebinding to an empty store must not report a successful write
        // while the lazy payload silently vanishes
        product
            .open(Box::new(MemoryStore::new()), OpenMode::NewProduct)
            .unwrap();
        let err = product.write();
        assert!(matches!(err, Err(ModelError::InvalidStructure(_))));
        assert!(product
            .store()
            .unwrap()
            .read_variable("measurements/t")
            .is_err());
    }

    #[test]
    fn closed_store_invalidates_lazy_variables() {
        let mut store = MemoryStore::new();
        store.open(OpenMode::NewProduct).unwrap();
        store
            .write_variable(
                "measurements/t",
                &NdArray::from_f64(vec![1.0]),
                &["x".to_string()],
                &Attributes::new(),
            )
            .unwrap();
        store.close().unwrap();

        let mut product = Product::new("p");
        product.open(Box::new(store), OpenMode::ReadOnly).unwrap();
        product.fetch_structure().unwrap();
        product.close().unwrap();

        // the variable is still visible in the tree but unreadable
        assert!(product.contains("measurements/t"));
        assert!(product.variable_array("measurements/t").is_err());
    }
}
