//! Template-driven metadata extraction from XML manifests.
//!
//! The accessor configuration carries a JSON template whose string
//! leaves are document queries, optionally wrapped in a conversion
//! helper: `to_int(path)`, `to_float(path)`, `to_str(path)`,
//! `to_iso8601(path)`, `to_bbox(path)`, `to_geojson(path)`, or
//! `text(literal)` for verbatim values. Reading an item walks the
//! template, replaces every leaf with the converted document value,
//! and returns the result as attributes. Queries that match nothing
//! resolve to `null` so one absent field never sinks the whole
//! manifest.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use serde_json::{json, Map, Value};
use tracing::debug;

use eo_common::Attributes;

use crate::error::{AccessorError, Result};
use crate::registry::AccessorConfig;
use crate::xml::dom::XmlElement;
use crate::xml::{namespaces_from_config, select_strings};
use crate::{FormatAccessor, Item};

/// Accessor resolving a metadata template against one manifest.
pub struct XmlMetadataAccessor {
    root: XmlElement,
    namespaces: BTreeMap<String, String>,
    template: Value,
}

impl XmlMetadataAccessor {
    pub fn open(path: &Path, config: &AccessorConfig) -> Result<Self> {
        let namespaces = namespaces_from_config(config)?;
        let template = config
            .get("template")
            .cloned()
            .ok_or_else(|| AccessorError::MissingConfig("template".into()))?;
        let text = std::fs::read_to_string(path)?;
        let root = crate::xml::dom::parse(&text)?;
        Ok(Self { root, namespaces, template })
    }

    fn translate(&self, node: &Value) -> Result<Value> {
        match node {
            Value::Object(object) => {
                let mut out = Map::new();
                for (key, child) in object {
                    out.insert(key.clone(), self.translate(child)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for child in items {
                    out.push(self.translate(child)?);
                }
                Ok(Value::Array(out))
            }
            Value::String(leaf) => self.resolve_leaf(leaf),
            other => Ok(other.clone()),
        }
    }

    fn resolve_leaf(&self, leaf: &str) -> Result<Value> {
        let (formatter, query) = split_formatter(leaf);
        if formatter == Some("text") {
            return Ok(Value::String(query.to_string()));
        }
        let values = match select_strings(&self.root, &self.namespaces, query) {
            Ok(values) => values,
            Err(AccessorError::KeyNotFound(path)) => {
                debug!(path = %path, "metadata query matched nothing");
                return Ok(Value::Null);
            }
            Err(err) => return Err(err),
        };
        match formatter {
            None | Some("to_str") => Ok(join_values(values)),
            Some("to_int") => {
                let n: i64 = values[0].parse().map_err(|_| {
                    AccessorError::Format(format!("'{}' is not an integer", values[0]))
                })?;
                Ok(json!(n))
            }
            Some("to_float") => {
                let n: f64 = values[0].parse().map_err(|_| {
                    AccessorError::Format(format!("'{}' is not a float", values[0]))
                })?;
                Ok(json!(n))
            }
            Some("to_iso8601") => Ok(Value::String(to_iso8601(&values[0]))),
            Some("to_bbox") => Ok(Value::Array(
                to_bbox(&values[0])?.iter().map(|v| json!(v)).collect(),
            )),
            Some("to_geojson") => to_geojson(&values[0]),
            Some(other) => Err(AccessorError::Format(format!(
                "unknown metadata conversion '{other}'"
            ))),
        }
    }
}

impl FormatAccessor for XmlMetadataAccessor {
    /// An empty key resolves the whole template; a non-empty key
    /// resolves one top-level template section.
    fn read_item(&self, local_path: &str) -> Result<Item> {
        let key = local_path.trim_matches('/');
        let section = if key.is_empty() {
            &self.template
        } else {
            self.template
                .get(key)
                .ok_or_else(|| AccessorError::KeyNotFound(key.to_string()))?
        };
        let resolved = self.translate(section)?;
        let attrs: Attributes = match resolved {
            Value::Object(map) => map,
            other => {
                let mut map = Attributes::new();
                map.insert(key.to_string(), other);
                map
            }
        };
        Ok(Item::attrs_only(attrs))
    }

    fn item_keys(&self) -> Vec<String> {
        match &self.template {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

/// Split `name(body)` into its parts; anything else is a bare query.
fn split_formatter(leaf: &str) -> (Option<&str>, &str) {
    if let Some(open) = leaf.find('(') {
        if leaf.ends_with(')') {
            let name = &leaf[..open];
            if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return (Some(name), &leaf[open + 1..leaf.len() - 1]);
            }
        }
    }
    (None, leaf)
}

fn join_values(values: Vec<String>) -> Value {
    if values.len() == 1 {
        Value::String(values.into_iter().next().unwrap_or_default())
    } else {
        Value::Array(values.into_iter().map(Value::String).collect())
    }
}

/// Compact sensing timestamps (`20230514T103021`) become RFC 3339;
/// values already containing separators pass through unchanged.
fn to_iso8601(value: &str) -> String {
    match NaiveDateTime::parse_from_str(value.trim(), "%Y%m%dT%H%M%S") {
        Ok(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        Err(_) => value.trim().to_string(),
    }
}

fn pos_list(value: &str) -> Result<Vec<(f64, f64)>> {
    let numbers: Vec<f64> = value
        .split_whitespace()
        .map(|n| {
            n.parse::<f64>()
                .map_err(|_| AccessorError::Format(format!("non-numeric coordinate '{n}'")))
        })
        .collect::<Result<_>>()?;
    if numbers.is_empty() || numbers.len() % 2 != 0 {
        return Err(AccessorError::Format(
            "coordinate list must hold lat/lon pairs".into(),
        ));
    }
    // footprints are transmitted latitude first
    Ok(numbers.chunks(2).map(|pair| (pair[0], pair[1])).collect())
}

/// `[min_lon, min_lat, max_lon, max_lat]` of a lat/lon position list.
fn to_bbox(value: &str) -> Result<[f64; 4]> {
    let pairs = pos_list(value)?;
    let mut bbox = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for (lat, lon) in pairs {
        bbox[0] = bbox[0].min(lon);
        bbox[1] = bbox[1].min(lat);
        bbox[2] = bbox[2].max(lon);
        bbox[3] = bbox[3].max(lat);
    }
    Ok(bbox)
}

/// GeoJSON polygon of a lat/lon position list, ring closed if needed.
fn to_geojson(value: &str) -> Result<Value> {
    let mut ring: Vec<Value> = pos_list(value)?
        .into_iter()
        .map(|(lat, lon)| json!([lon, lat]))
        .collect();
    if ring.first() != ring.last() {
        if let Some(first) = ring.first().cloned() {
            ring.push(first);
        }
    }
    Ok(json!({ "type": "Polygon", "coordinates": [ring] }))
}
