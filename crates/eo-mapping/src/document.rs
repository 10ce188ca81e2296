//! Mapping-document model and load-time validation.
//!
//! A mapping document is the declarative description of one legacy
//! format: a recognition rule, an ordered list of data-mapping
//! entries, and any number of auxiliary dictionaries (namespace
//! tables, metadata templates) that entries reference from their
//! `accessor_config` by slash- or dot-separated path. References are
//! resolved once at load time so every entry carries a self-contained
//! configuration afterwards.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use eo_common::path::split_source_path;
use eo_common::Attributes;

use crate::error::{MappingError, Result};

/// Pattern-based test selecting which document applies to a product.
#[derive(Debug, Clone, Deserialize)]
pub struct Recognition {
    /// Regex evaluated against the legacy product's root name.
    pub filename_pattern: String,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Declared transformation pipeline of one entry, applied in the
/// fixed order `sub_array`, `pack_bits`, `dimensions`, `attributes`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Parameters {
    /// Dimension name to integer index; each named axis is indexed and
    /// removed.
    pub sub_array: Option<Map<String, Value>>,
    /// Name of the exploded per-bit dimension to collapse into flag
    /// words.
    pub pack_bits: Option<String>,
    /// Replacement dimension-name list; length must equal the rank
    /// left by the earlier stages.
    pub dimensions: Option<Vec<String>>,
    /// Attributes merged over the native ones; declared keys win.
    pub attributes: Option<Attributes>,
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One declared variable or metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingEntry {
    #[serde(default)]
    pub short_name: Option<String>,
    /// `file-pattern[:local-path]`; the pattern is a regex over the
    /// product's relative file tree.
    pub source_path: String,
    /// Target path in the harmonized tree; empty merges attributes at
    /// the product root.
    pub target_path: String,
    /// Accessor registry key.
    pub item_format: String,
    #[serde(default)]
    pub is_optional: bool,
    /// Accessor key given separately from `source_path`.
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub accessor_config: Map<String, Value>,
    #[serde(default)]
    pub parameters: Parameters,
}

impl MappingEntry {
    /// The file pattern and the accessor key, wherever the key was
    /// declared.
    pub fn pattern_and_key(&self) -> (String, String) {
        let (pattern, inline) = split_source_path(&self.source_path);
        let key = self
            .local_path
            .clone()
            .or(inline)
            .unwrap_or_default();
        (pattern, key)
    }

    fn validate(&self) -> Result<()> {
        let (_, inline) = split_source_path(&self.source_path);
        if inline.is_some() && self.local_path.is_some() {
            return Err(MappingError::InvalidConfig(format!(
                "entry '{}' declares a local path both inline and as 'local_path'",
                self.target_path
            )));
        }
        Ok(())
    }
}

/// One loaded, validated, reference-resolved mapping document.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingDocument {
    pub recognition: Recognition,
    pub data_mapping: Vec<MappingEntry>,
    /// Free-form named dictionaries referenced by `accessor_config`.
    #[serde(flatten)]
    pub auxiliary: Map<String, Value>,
    #[serde(skip)]
    filename_regex: Option<Regex>,
}

impl MappingDocument {
    pub fn from_str(json: &str) -> Result<Self> {
        let document: MappingDocument = serde_json::from_str(json)?;
        document.finalize()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_str(&std::fs::read_to_string(path)?)
    }

    fn finalize(mut self) -> Result<Self> {
        let regex = Regex::new(&self.recognition.filename_pattern).map_err(|err| {
            MappingError::InvalidConfig(format!(
                "recognition pattern '{}' is not a valid regex: {err}",
                self.recognition.filename_pattern
            ))
        })?;
        self.filename_regex = Some(regex);

        let auxiliary = self.auxiliary.clone();
        for entry in &mut self.data_mapping {
            entry.validate()?;
            for value in entry.accessor_config.values_mut() {
                resolve_refs(&auxiliary, value);
            }
        }
        Ok(self)
    }

    /// Whether this document's recognition rule accepts the product.
    pub fn recognizes(&self, product_name: &str) -> bool {
        self.filename_regex
            .as_ref()
            .map(|regex| regex.is_match(product_name))
            .unwrap_or(false)
    }

    /// Human-readable label for logs and reports.
    pub fn label(&self) -> &str {
        self.recognition
            .product_type
            .as_deref()
            .unwrap_or(&self.recognition.filename_pattern)
    }
}

/// Replace string values that name a path into the auxiliary
/// dictionaries with the referenced value. Strings that do not
/// resolve are left as-is; a lone key name is never treated as a
/// reference.
fn resolve_refs(auxiliary: &Map<String, Value>, value: &mut Value) {
    match value {
        Value::String(text) => {
            if let Some(resolved) = lookup_auxiliary(auxiliary, text) {
                *value = resolved;
            }
        }
        Value::Object(object) => {
            for child in object.values_mut() {
                resolve_refs(auxiliary, child);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                resolve_refs(auxiliary, child);
            }
        }
        _ => {}
    }
}

fn lookup_auxiliary(auxiliary: &Map<String, Value>, reference: &str) -> Option<Value> {
    let segments: Vec<&str> = reference
        .split(|c| c == '/' || c == '.')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() < 2 {
        return None;
    }
    let mut current = auxiliary.get(segments[0])?;
    for segment in &segments[1..] {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current.clone())
}
