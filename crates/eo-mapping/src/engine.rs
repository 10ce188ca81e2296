//! The conversion engine: recognition and population.
//!
//! One run walks a fixed state machine: `Unopened` to `Recognizing`
//! (pick the mapping document) to `Populating` (apply every data
//! mapping entry) to `Populated` or `Failed`. Documents are tried in
//! registration order and the first whose recognition rule matches
//! wins, so recognition is deterministic across runs.

use std::path::Path;

use tracing::{debug, info, warn};

use eo_accessors::{AccessorError, AccessorRegistry};
use eo_common::listing::FileListing;
use eo_model::Product;

use crate::document::{MappingDocument, MappingEntry};
use crate::error::{MappingError, Result};
use crate::{pipeline, resolver};

/// Conversion run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Unopened,
    Recognizing,
    Populating,
    Populated,
    Failed,
}

/// One optional entry skipped during population.
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub target_path: String,
    pub reason: String,
}

/// Outcome of one conversion run.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    /// Label of the mapping document that recognized the product.
    pub document: String,
    pub entries_applied: usize,
    pub skipped: Vec<SkippedEntry>,
}

/// Mapping engine holding the registered documents and the accessor
/// registry.
pub struct MappingEngine {
    documents: Vec<MappingDocument>,
    registry: AccessorRegistry,
    state: RunState,
}

impl MappingEngine {
    pub fn new(registry: AccessorRegistry) -> Self {
        Self { documents: Vec::new(), registry, state: RunState::Unopened }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Register one document. Registration order is recognition
    /// priority.
    pub fn register_document(&mut self, document: MappingDocument) {
        debug!(document = %document.label(), "registered mapping document");
        self.documents.push(document);
    }

    /// Load every `*.json` mapping document under `dir`, in sorted
    /// filename order so recognition priority is stable across runs.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        let loaded = paths.len();
        for path in paths {
            self.register_document(MappingDocument::from_file(&path)?);
        }
        Ok(loaded)
    }

    /// First registered document recognizing `product_name`.
    pub fn recognize(&self, product_name: &str) -> Result<&MappingDocument> {
        self.documents
            .iter()
            .find(|document| document.recognizes(product_name))
            .ok_or_else(|| MappingError::UnrecognizedProduct(product_name.to_string()))
    }

    /// Convert one legacy product into a harmonized in-memory tree.
    ///
    /// Optional entries whose source is missing or unparsable are
    /// skipped with a recorded warning; any other failure aborts the
    /// run with nothing attached worth persisting.
    pub fn convert(&mut self, product: &dyn FileListing) -> Result<(Product, ConversionReport)> {
        self.state = RunState::Recognizing;
        let document = match self.recognize(product.name()) {
            Ok(document) => document.clone(),
            Err(err) => {
                self.state = RunState::Failed;
                return Err(err);
            }
        };
        info!(product = product.name(), document = %document.label(), "recognized legacy product");

        self.state = RunState::Populating;
        let mut harmonized = Product::new(product.name());
        let mut report = ConversionReport {
            document: document.label().to_string(),
            entries_applied: 0,
            skipped: Vec::new(),
        };
        let listing = product.relative_paths()?;

        for entry in &document.data_mapping {
            match self.apply_entry(entry, &listing, product, &mut harmonized) {
                Ok(()) => report.entries_applied += 1,
                Err(err) if entry.is_optional && is_skippable(&err) => {
                    warn!(
                        target_path = %entry.target_path,
                        error = %err,
                        "skipping optional mapping entry"
                    );
                    report.skipped.push(SkippedEntry {
                        target_path: entry.target_path.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    self.state = RunState::Failed;
                    return Err(err);
                }
            }
        }

        self.state = RunState::Populated;
        info!(
            applied = report.entries_applied,
            skipped = report.skipped.len(),
            "population complete"
        );
        Ok((harmonized, report))
    }

    fn apply_entry(
        &self,
        entry: &MappingEntry,
        listing: &[String],
        product: &dyn FileListing,
        harmonized: &mut Product,
    ) -> Result<()> {
        let (pattern, key) = entry.pattern_and_key();
        let relative = resolver::resolve(listing, &pattern)?;
        let physical = product.resolve(&relative);
        debug!(
            target_path = %entry.target_path,
            source = %relative,
            format = %entry.item_format,
            "applying mapping entry"
        );

        let accessor = self
            .registry
            .open(&entry.item_format, &physical, &entry.accessor_config)?;
        let item = accessor.read_item(&key)?;

        match item.array {
            // metadata-only items merge into the target node's attributes
            None => {
                if !entry.parameters.is_empty() {
                    return Err(MappingError::InvalidConfig(format!(
                        "entry '{}' declares a pipeline for a metadata-only item",
                        entry.target_path
                    )));
                }
                harmonized.merge_attrs_at(&entry.target_path, &item.attrs)?;
            }
            Some(_) => {
                let out = pipeline::apply(&entry.parameters, item)?;
                harmonized.add_variable(&entry.target_path, out.array, out.dims, out.attrs)?;
            }
        }
        Ok(())
    }
}

/// Whether an optional entry may convert this failure into a skip.
/// Only a missing source or an unparsable/incomplete resource
/// qualifies; configuration bugs and non-missing I/O failures (a
/// present but unreadable file) always abort.
fn is_skippable(err: &MappingError) -> bool {
    match err {
        MappingError::ResourceNotFound(_)
        | MappingError::Accessor(AccessorError::Format(_))
        | MappingError::Accessor(AccessorError::KeyNotFound(_)) => true,
        MappingError::Accessor(AccessorError::Io(io_err)) => {
            io_err.kind() == std::io::ErrorKind::NotFound
        }
        _ => false,
    }
}
