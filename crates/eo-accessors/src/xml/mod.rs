//! Query-driven XML accessor and its document/path machinery.

pub mod dom;
pub mod xpath;

use std::collections::BTreeMap;
use std::path::Path;

use eo_common::NdArray;

use crate::error::{AccessorError, Result};
use crate::registry::AccessorConfig;
use crate::xml::dom::XmlElement;
use crate::xml::xpath::{LocationPath, Terminal};

/// Prefix-to-URI table from the `namespace` configuration object.
pub(crate) fn namespaces_from_config(config: &AccessorConfig) -> Result<BTreeMap<String, String>> {
    let mut table = BTreeMap::new();
    if let Some(value) = config.get("namespace") {
        let object = value.as_object().ok_or_else(|| {
            AccessorError::MissingConfig("'namespace' must be an object of prefix: uri pairs".into())
        })?;
        for (prefix, uri) in object {
            let uri = uri.as_str().ok_or_else(|| {
                AccessorError::MissingConfig(format!("namespace uri for '{prefix}' must be a string"))
            })?;
            table.insert(prefix.clone(), uri.to_string());
        }
    }
    Ok(table)
}

/// String values selected by a path: attribute values for an `@attr`
/// terminal, trimmed character data otherwise.
pub(crate) fn select_strings(
    root: &XmlElement,
    namespaces: &BTreeMap<String, String>,
    path: &str,
) -> Result<Vec<String>> {
    let location = LocationPath::parse(path)?;
    let nodes = location.select(root, namespaces)?;
    let values: Vec<String> = match location.terminal() {
        Some(Terminal::Attr(attr)) => nodes
            .iter()
            .filter_map(|node| node.attr(attr))
            .map(str::to_string)
            .collect(),
        _ => nodes.iter().map(|node| node.trimmed_text().to_string()).collect(),
    };
    if values.is_empty() {
        return Err(AccessorError::KeyNotFound(path.to_string()));
    }
    Ok(values)
}

/// Numeric if every value parses as a float, text otherwise. One value
/// becomes a scalar, several become a 1-D array.
pub(crate) fn strings_to_array(values: Vec<String>) -> NdArray {
    let numeric: Option<Vec<f64>> = values.iter().map(|v| v.parse::<f64>().ok()).collect();
    match (numeric, values.len()) {
        (Some(numbers), 1) => NdArray::scalar_f64(numbers[0]),
        (Some(numbers), _) => NdArray::from_f64(numbers),
        (None, 1) => NdArray::scalar_text(values.into_iter().next().unwrap_or_default()),
        (None, _) => NdArray::from_text(values),
    }
}

/// Accessor resolving location-path keys against one XML document.
pub struct XmlAccessor {
    root: XmlElement,
    namespaces: BTreeMap<String, String>,
}

impl XmlAccessor {
    /// Parse the whole document; the file handle is released before
    /// this returns.
    pub fn open(path: &Path, config: &AccessorConfig) -> Result<Self> {
        let namespaces = namespaces_from_config(config)?;
        let text = std::fs::read_to_string(path)?;
        let root = dom::parse(&text)?;
        Ok(Self { root, namespaces })
    }

    pub(crate) fn root(&self) -> &XmlElement {
        &self.root
    }

    pub(crate) fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }
}

impl crate::FormatAccessor for XmlAccessor {
    fn read_item(&self, local_path: &str) -> Result<crate::Item> {
        let values = select_strings(&self.root, &self.namespaces, local_path)?;
        Ok(crate::Item::from_array(strings_to_array(values)))
    }

    fn item_keys(&self) -> Vec<String> {
        // a document is queried by path, not enumerated
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormatAccessor;
    use eo_common::ArrayValues;
    use serde_json::json;
    use std::io::Write;

    fn write_doc(xml: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(xml.as_bytes()).unwrap();
        f
    }

    fn open(xml: &str) -> (tempfile::NamedTempFile, XmlAccessor) {
        let f = write_doc(xml);
        let mut config = AccessorConfig::new();
        config.insert("namespace".into(), json!({"n1": "http://example.com/ns"}));
        let accessor = XmlAccessor::open(f.path(), &config).unwrap();
        (f, accessor)
    }

    #[test]
    fn single_numeric_value_becomes_a_scalar() {
        let (_f, accessor) =
            open(r#"<n1:root xmlns:n1="http://example.com/ns"><Gain>3.25</Gain></n1:root>"#);
        let item = accessor.read_item("n1:root/Gain").unwrap();
        let array = item.array.unwrap();
        assert_eq!(array.rank(), 0);
        assert_eq!(array.values(), &ArrayValues::Float64(vec![3.25]));
    }

    #[test]
    fn repeated_elements_become_a_vector() {
        let (_f, accessor) = open(
            r#"<n1:root xmlns:n1="http://example.com/ns">
                 <W>1</W><W>2</W><W>3</W>
               </n1:root>"#,
        );
        let item = accessor.read_item("n1:root/W").unwrap();
        let array = item.array.unwrap();
        assert_eq!(array.shape(), &[3]);
        assert_eq!(array.values(), &ArrayValues::Float64(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn non_numeric_values_stay_text() {
        let (_f, accessor) =
            open(r#"<n1:root xmlns:n1="http://example.com/ns"><Id>S2A_MSIL1C</Id></n1:root>"#);
        let item = accessor.read_item("n1:root/Id").unwrap();
        assert_eq!(
            item.array.unwrap().values(),
            &ArrayValues::Text(vec!["S2A_MSIL1C".to_string()])
        );
    }

    #[test]
    fn missing_path_is_key_not_found() {
        let (_f, accessor) =
            open(r#"<n1:root xmlns:n1="http://example.com/ns"><Gain>1</Gain></n1:root>"#);
        assert!(matches!(
            accessor.read_item("n1:root/Absent"),
            Err(AccessorError::KeyNotFound(_))
        ));
    }
}
