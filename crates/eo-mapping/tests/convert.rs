//! End-to-end conversion of a synthetic legacy product.

use std::fs;
use std::path::PathBuf;

use serde_json::json;

use eo_accessors::AccessorRegistry;
use eo_common::{ArrayValues, DirListing};
use eo_mapping::{MappingDocument, MappingEngine, MappingError, RunState};
use eo_model::{NodeRef, Product};
use eo_store::{OpenMode, ZarrStore};

const TILE_XML: &str = r#"<n1:Tile xmlns:n1="http://example.com/tile">
  <General_Info>
    <TILE_ID>T32TQM</TILE_ID>
    <SENSING_TIME>20230514T103021</SENSING_TIME>
  </General_Info>
  <Wavelengths>
    <W>443.0</W>
    <W>490.0</W>
    <W>560.0</W>
  </Wavelengths>
</n1:Tile>"#;

/// Four fixed 2-byte telemetry records whose top three bits are the
/// detector mode: 5, 3, 0, 7.
const PACKETS: [u8; 8] = [0b1010_0001, 0x00, 0b0110_0000, 0x00, 0b0001_1111, 0x00, 0b1110_0000, 0x00];

fn write_legacy_product(dir: &tempfile::TempDir) -> PathBuf {
    let root = dir.path().join("S9X_TEL_20230514T103021.SAFE");
    fs::create_dir_all(root.join("telemetry")).unwrap();
    fs::write(root.join("telemetry/packets.dat"), PACKETS).unwrap();
    fs::write(root.join("MTD_TL.xml"), TILE_XML).unwrap();
    root
}

fn mapping_document() -> MappingDocument {
    MappingDocument::from_str(
        &json!({
            "recognition": {
                "filename_pattern": r"^S9X_TEL_.*\.SAFE$",
                "product_type": "S9X_TELEMETRY"
            },
            "xml_mapping": {
                "namespace": {"n1": "http://example.com/tile"}
            },
            "metadata_mapping": {
                "CF": {
                    "title": "n1:Tile/General_Info/TILE_ID",
                    "datetime": "to_iso8601(n1:Tile/General_Info/SENSING_TIME)"
                }
            },
            "data_mapping": [
                {
                    "short_name": "detector_mode",
                    "source_path": r"telemetry/packets\.dat:0:3:3",
                    "target_path": "measurements/telemetry/detector_mode",
                    "item_format": "binary",
                    "accessor_config": {"record_length": 2},
                    "parameters": {
                        "dimensions": ["packet_number"],
                        "attributes": {"long_name": "detector mode flags"}
                    }
                },
                {
                    "short_name": "wavelength",
                    "source_path": r"MTD_TL\.xml:n1:Tile/Wavelengths/W",
                    "target_path": "coordinates/wavelength",
                    "item_format": "xml",
                    "accessor_config": {"namespace": "xml_mapping/namespace"},
                    "parameters": {"dimensions": ["wavelength"]}
                },
                {
                    "short_name": "calibration",
                    "source_path": r"annex/calibration\.dat:0:16:16",
                    "target_path": "measurements/telemetry/calibration",
                    "item_format": "binary",
                    "is_optional": true,
                    "accessor_config": {"record_length": 4}
                },
                {
                    "source_path": r"MTD_TL\.xml",
                    "target_path": "",
                    "item_format": "xmlmetadata",
                    "accessor_config": {
                        "namespace": "xml_mapping/namespace",
                        "template": "metadata_mapping/CF"
                    }
                }
            ]
        })
        .to_string(),
    )
    .unwrap()
}

fn engine() -> MappingEngine {
    let mut engine = MappingEngine::new(AccessorRegistry::with_defaults());
    engine.register_document(mapping_document());
    engine
}

#[test]
fn conversion_populates_a_valid_product() {
    let dir = tempfile::tempdir().unwrap();
    let root = write_legacy_product(&dir);
    let listing = DirListing::new(&root).unwrap();

    let mut engine = engine();
    let (product, report) = engine.convert(&listing).unwrap();
    assert_eq!(engine.state(), RunState::Populated);
    assert_eq!(report.document, "S9X_TELEMETRY");
    assert_eq!(report.entries_applied, 3);

    product.validate().unwrap();

    match product.get("measurements/telemetry/detector_mode").unwrap() {
        NodeRef::Variable(variable) => {
            assert_eq!(variable.dims(), ["packet_number"]);
            assert_eq!(
                variable.array().unwrap().values(),
                &ArrayValues::UInt64(vec![5, 3, 0, 7])
            );
            assert_eq!(variable.attrs()["long_name"], json!("detector mode flags"));
        }
        NodeRef::Group(_) => panic!("expected a variable"),
    }

    // metadata entry landed on the product root
    assert_eq!(product.attrs()["title"], json!("T32TQM"));
    assert_eq!(product.attrs()["datetime"], json!("2023-05-14T10:30:21Z"));
}

#[test]
fn missing_optional_source_is_skipped_without_a_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let root = write_legacy_product(&dir);
    let listing = DirListing::new(&root).unwrap();

    let (product, report) = engine().convert(&listing).unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].target_path, "measurements/telemetry/calibration");
    assert!(!product.contains("measurements/telemetry/calibration"));
}

#[test]
fn missing_required_source_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = write_legacy_product(&dir);
    fs::remove_file(root.join("telemetry/packets.dat")).unwrap();
    let listing = DirListing::new(&root).unwrap();

    let mut engine = engine();
    let err = engine.convert(&listing);
    assert!(matches!(err, Err(MappingError::ResourceNotFound(_))));
    assert_eq!(engine.state(), RunState::Failed);
}

#[test]
fn unrecognized_product_aborts_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("UNKNOWN_PRODUCT");
    fs::create_dir_all(&root).unwrap();
    let listing = DirListing::new(&root).unwrap();

    let mut engine = engine();
    assert!(matches!(
        engine.convert(&listing),
        Err(MappingError::UnrecognizedProduct(_))
    ));
    assert_eq!(engine.state(), RunState::Failed);
}

#[test]
fn converted_product_round_trips_through_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let root = write_legacy_product(&dir);
    let listing = DirListing::new(&root).unwrap();

    let (mut product, _) = engine().convert(&listing).unwrap();
    let target = dir.path().join("harmonized.zarr");
    product
        .open(Box::new(ZarrStore::new(&target)), OpenMode::NewProduct)
        .unwrap();
    product.write().unwrap();
    product.close().unwrap();

    let mut reloaded = Product::new("reloaded");
    reloaded
        .open(Box::new(ZarrStore::new(&target)), OpenMode::ReadOnly)
        .unwrap();
    reloaded.load().unwrap();

    let array = reloaded
        .variable_array("measurements/telemetry/detector_mode")
        .unwrap();
    assert_eq!(array.values(), &ArrayValues::UInt64(vec![5, 3, 0, 7]));
    match reloaded.get("coordinates/wavelength").unwrap() {
        NodeRef::Variable(variable) => assert_eq!(variable.dims(), ["wavelength"]),
        NodeRef::Group(_) => panic!("expected a variable"),
    }
}
