//! Integration test: write variables and attributes through the Zarr
//! store and read them back byte-exactly.

use serde_json::json;

use eo_common::{ArrayValues, Attributes, NdArray};
use eo_store::{EntryKind, OpenMode, ProductStore, StoreError, ZarrStore};

fn radiance_attrs() -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("units".to_string(), json!("W.m-2.sr-1.um-1"));
    attrs.insert("scale_factor".to_string(), json!(0.01));
    attrs.insert("flag_meanings".to_string(), json!(["saturated", "invalid"]));
    attrs
}

#[test]
fn variable_roundtrip_preserves_dims_and_attrs() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("product.zarr");

    let array = NdArray::new(
        vec![2, 3],
        ArrayValues::Float64(vec![1.5, 2.5, 3.5, 4.5, 5.5, 6.5]),
    )
    .unwrap();
    let dims = vec!["rows".to_string(), "columns".to_string()];
    let attrs = radiance_attrs();

    let mut store = ZarrStore::new(&target);
    store.open(OpenMode::NewProduct).unwrap();
    store
        .write_variable("measurements/radiance", &array, &dims, &attrs)
        .unwrap();
    store.close().unwrap();

    let mut reader = ZarrStore::new(&target);
    reader.open(OpenMode::ReadOnly).unwrap();
    let back = reader.read_variable("measurements/radiance").unwrap();
    assert_eq!(back.array, array);
    assert_eq!(back.dims, dims);
    assert_eq!(back.attrs, attrs);
}

#[test]
fn integer_and_scalar_variables_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("product.zarr");

    let flags = NdArray::from_u64(vec![5, 2, 7]);
    let scalar = NdArray::scalar_f64(42.0);

    let mut store = ZarrStore::new(&target);
    store.open(OpenMode::NewProduct).unwrap();
    store
        .write_variable("quality/flags", &flags, &["packet_number".to_string()], &Attributes::new())
        .unwrap();
    store
        .write_variable("conditions/orbit", &scalar, &[], &Attributes::new())
        .unwrap();
    store.close().unwrap();

    let mut reader = ZarrStore::new(&target);
    reader.open(OpenMode::ReadOnly).unwrap();
    assert_eq!(reader.read_variable("quality/flags").unwrap().array, flags);
    let back = reader.read_variable("conditions/orbit").unwrap();
    assert_eq!(back.array.rank(), 0);
    assert_eq!(back.array, scalar);
}

#[test]
fn group_attrs_merge_and_listdir() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("product.zarr");

    let mut store = ZarrStore::new(&target);
    store.open(OpenMode::NewProduct).unwrap();

    let mut attrs = Attributes::new();
    attrs.insert("platform".to_string(), json!("sentinel-3a"));
    store.write_attrs("", &attrs).unwrap();

    let mut more = Attributes::new();
    more.insert("processing_level".to_string(), json!("1"));
    store.write_attrs("", &more).unwrap();

    store
        .write_variable(
            "measurements/radiance",
            &NdArray::from_f32(vec![1.0, 2.0]),
            &["columns".to_string()],
            &Attributes::new(),
        )
        .unwrap();
    store.close().unwrap();

    let mut reader = ZarrStore::new(&target);
    reader.open(OpenMode::ReadOnly).unwrap();
    let root = reader.read_attrs("").unwrap();
    assert_eq!(root["platform"], json!("sentinel-3a"));
    assert_eq!(root["processing_level"], json!("1"));

    let entries = reader.listdir("").unwrap();
    assert!(entries.contains(&eo_store::StoreEntry {
        name: "measurements".to_string(),
        kind: EntryKind::Group
    }));
    let meas = reader.listdir("measurements").unwrap();
    assert_eq!(meas.len(), 1);
    assert_eq!(meas[0].kind, EntryKind::Variable);
    assert!(reader.is_variable("measurements/radiance").unwrap());
}

#[test]
fn group_attrs_refuse_to_clobber_a_variable() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("product.zarr");

    let flags = NdArray::from_u64(vec![5, 2, 7]);
    let mut store = ZarrStore::new(&target);
    store.open(OpenMode::NewProduct).unwrap();
    store
        .write_variable("quality/flags", &flags, &["packet_number".to_string()], &Attributes::new())
        .unwrap();

    let mut attrs = Attributes::new();
    attrs.insert("comment".to_string(), json!("oops"));
    let err = store.write_attrs("quality/flags", &attrs);
    assert!(matches!(err, Err(StoreError::Unsupported(_))));

    // the variable survives untouched
    assert_eq!(store.read_variable("quality/flags").unwrap().array, flags);
}

#[test]
fn readonly_and_newproduct_guards() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("product.zarr");

    let mut store = ZarrStore::new(&target);
    store.open(OpenMode::NewProduct).unwrap();
    store.close().unwrap();

    // opening an existing product as new must fail
    let mut again = ZarrStore::new(&target);
    assert!(matches!(again.open(OpenMode::NewProduct), Err(StoreError::Backend(_))));

    let mut reader = ZarrStore::new(&target);
    reader.open(OpenMode::ReadOnly).unwrap();
    let err = reader.write_attrs("", &Attributes::new());
    assert!(matches!(err, Err(StoreError::ReadOnly)));
}
