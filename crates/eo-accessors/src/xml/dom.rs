//! Minimal namespace-aware XML document tree.
//!
//! Product manifests and tile metadata are small enough to hold fully
//! in memory, so the accessors parse once into this tree and query it
//! afterwards without touching the file again.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::error::{AccessorError, Result};

/// One parsed element: local name, resolved namespace URI, attributes
/// (namespace declarations stripped), child elements and character
/// data.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub namespace: Option<String>,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Character data with surrounding whitespace removed.
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// All elements of the subtree rooted here, in document order,
    /// excluding `self`.
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        let mut stack: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

fn xml_err(err: impl std::fmt::Display) -> AccessorError {
    AccessorError::Format(format!("XML parse error: {err}"))
}

fn element_from(resolve: &ResolveResult<'_>, start: &BytesStart<'_>) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let namespace = match resolve {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    };
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement { name, namespace, attrs, children: Vec::new(), text: String::new() })
}

/// Parse a whole document into its root element.
pub fn parse(xml: &str) -> Result<XmlElement> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    loop {
        match reader.read_resolved_event().map_err(xml_err)? {
            (resolve, Event::Start(start)) => {
                stack.push(element_from(&resolve, &start)?);
            }
            (resolve, Event::Empty(start)) => {
                let element = element_from(&resolve, &start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            (_, Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| xml_err("closing tag without opening tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            (_, Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(xml_err)?);
                }
            }
            (_, Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            (_, Event::Eof) => {
                return Err(xml_err("document ended before the root element closed"));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_with_namespaces() {
        let doc = parse(
            r#"<n1:root xmlns:n1="http://example.com/ns">
                 <a id="1">hello</a>
                 <a id="2"><b/></a>
               </n1:root>"#,
        )
        .unwrap();
        assert_eq!(doc.name, "root");
        assert_eq!(doc.namespace.as_deref(), Some("http://example.com/ns"));
        assert_eq!(doc.children.len(), 2);
        assert_eq!(doc.children[0].attr("id"), Some("1"));
        assert_eq!(doc.children[0].trimmed_text(), "hello");
        assert_eq!(doc.children[1].children[0].name, "b");
        assert!(doc.children[1].children[0].namespace.is_none());
    }

    #[test]
    fn descendants_are_in_document_order() {
        let doc = parse("<r><a><b/></a><c/></r>").unwrap();
        let names: Vec<&str> = doc.descendants().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn truncated_document_is_rejected() {
        assert!(parse("<r><a>").is_err());
    }
}
