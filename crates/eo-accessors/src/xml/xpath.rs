//! Location-path evaluator for the query subset the mapping files use.
//!
//! Supported: child steps (`a/b`), descendant steps (`a//b`), wildcard
//! names (`*`), namespace prefixes resolved through a caller-supplied
//! table (`n1:General_Info`), attribute-equality predicates
//! (`[@bandId='3']`), 1-based positional predicates (`[2]`), and a
//! trailing `@attr` or `text()` terminal. That is the full vocabulary
//! found across the mission mapping files; anything else is rejected.

use std::collections::BTreeMap;

use crate::error::{AccessorError, Result};
use crate::xml::dom::XmlElement;

/// What the path ultimately selects from the matched elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// Character data of each matched element.
    Text,
    /// Value of this attribute on each matched element.
    Attr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Named { prefix: Option<String>, local: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    AttrEquals(String, String),
    Position(usize),
}

#[derive(Debug, Clone)]
struct Step {
    name: NameTest,
    predicates: Vec<Predicate>,
    /// True when this step was preceded by `//`.
    descendant: bool,
}

/// A parsed location path.
#[derive(Debug, Clone)]
pub struct LocationPath {
    steps: Vec<Step>,
    terminal: Option<Terminal>,
}

impl LocationPath {
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        if path.is_empty() {
            return Err(AccessorError::Format("empty location path".into()));
        }
        let path = path.strip_prefix('/').unwrap_or(path);

        let mut steps = Vec::new();
        let mut terminal = None;
        let mut descendant = false;
        for segment in path.split('/') {
            if segment.is_empty() {
                // the empty segment between the two slashes of `//`
                descendant = true;
                continue;
            }
            if terminal.is_some() {
                return Err(AccessorError::Format(format!(
                    "path continues past its terminal: '{path}'"
                )));
            }
            if let Some(attr) = segment.strip_prefix('@') {
                terminal = Some(Terminal::Attr(attr.to_string()));
            } else if segment == "text()" {
                terminal = Some(Terminal::Text);
            } else {
                steps.push(parse_step(segment, descendant)?);
            }
            descendant = false;
        }
        if steps.is_empty() {
            return Err(AccessorError::Format(format!("no element steps in path '{path}'")));
        }
        Ok(Self { steps, terminal })
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    /// Evaluate against `root`, which the first step must match (the
    /// path is absolute, rooted at the document element).
    pub fn select<'a>(
        &self,
        root: &'a XmlElement,
        namespaces: &BTreeMap<String, String>,
    ) -> Result<Vec<&'a XmlElement>> {
        let mut current: Vec<&XmlElement> = Vec::new();
        let first = &self.steps[0];
        let pool: Vec<&XmlElement> = if first.descendant {
            std::iter::once(root).chain(root.descendants()).collect()
        } else {
            vec![root]
        };
        current.extend(filter_step(&pool, first, namespaces)?);

        for step in &self.steps[1..] {
            let mut next = Vec::new();
            for node in &current {
                let pool: Vec<&XmlElement> = if step.descendant {
                    node.descendants()
                } else {
                    node.children.iter().collect()
                };
                next.extend(filter_step(&pool, step, namespaces)?);
            }
            current = next;
        }
        Ok(current)
    }
}

fn parse_step(segment: &str, descendant: bool) -> Result<Step> {
    let (name_part, mut rest) = match segment.find('[') {
        Some(idx) => (&segment[..idx], &segment[idx..]),
        None => (segment, ""),
    };
    let name = if name_part == "*" {
        NameTest::Any
    } else {
        match name_part.split_once(':') {
            Some((prefix, local)) => NameTest::Named {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => NameTest::Named { prefix: None, local: name_part.to_string() },
        }
    };

    let mut predicates = Vec::new();
    while !rest.is_empty() {
        let close = rest
            .find(']')
            .ok_or_else(|| AccessorError::Format(format!("unclosed predicate in '{segment}'")))?;
        if !rest.starts_with('[') {
            return Err(AccessorError::Format(format!("malformed predicate in '{segment}'")));
        }
        predicates.push(parse_predicate(&rest[1..close], segment)?);
        rest = &rest[close + 1..];
    }
    Ok(Step { name, predicates, descendant })
}

fn parse_predicate(body: &str, segment: &str) -> Result<Predicate> {
    let body = body.trim();
    if let Some(attr_expr) = body.strip_prefix('@') {
        let (attr, value) = attr_expr.split_once('=').ok_or_else(|| {
            AccessorError::Format(format!("attribute predicate without '=' in '{segment}'"))
        })?;
        let value = value.trim();
        let value = value
            .strip_prefix('\'')
            .and_then(|v| v.strip_suffix('\''))
            .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
            .ok_or_else(|| {
                AccessorError::Format(format!("unquoted predicate value in '{segment}'"))
            })?;
        return Ok(Predicate::AttrEquals(attr.trim().to_string(), value.to_string()));
    }
    let position: usize = body.parse().map_err(|_| {
        AccessorError::Format(format!("unsupported predicate '[{body}]' in '{segment}'"))
    })?;
    if position == 0 {
        return Err(AccessorError::Format("positional predicates are 1-based".into()));
    }
    Ok(Predicate::Position(position))
}

fn name_matches(
    element: &XmlElement,
    name: &NameTest,
    namespaces: &BTreeMap<String, String>,
) -> Result<bool> {
    match name {
        NameTest::Any => Ok(true),
        NameTest::Named { prefix, local } => {
            if element.name != *local {
                return Ok(false);
            }
            match prefix {
                None => Ok(true),
                Some(prefix) => {
                    let uri = namespaces.get(prefix).ok_or_else(|| {
                        AccessorError::MissingConfig(format!(
                            "namespace prefix '{prefix}' is not declared in the accessor configuration"
                        ))
                    })?;
                    Ok(element.namespace.as_deref() == Some(uri.as_str()))
                }
            }
        }
    }
}

fn filter_step<'a>(
    pool: &[&'a XmlElement],
    step: &Step,
    namespaces: &BTreeMap<String, String>,
) -> Result<Vec<&'a XmlElement>> {
    let mut matched = Vec::new();
    for element in pool {
        if !name_matches(element, &step.name, namespaces)? {
            continue;
        }
        let attrs_ok = step.predicates.iter().all(|pred| match pred {
            Predicate::AttrEquals(attr, value) => element.attr(attr) == Some(value.as_str()),
            Predicate::Position(_) => true,
        });
        if attrs_ok {
            matched.push(*element);
        }
    }
    for pred in &step.predicates {
        if let Predicate::Position(position) = pred {
            matched = match matched.get(position - 1) {
                Some(element) => vec![*element],
                None => Vec::new(),
            };
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::dom;

    fn namespaces() -> BTreeMap<String, String> {
        let mut ns = BTreeMap::new();
        ns.insert("n1".to_string(), "http://example.com/ns".to_string());
        ns
    }

    fn sample() -> XmlElement {
        dom::parse(
            r#"<n1:root xmlns:n1="http://example.com/ns">
                 <Grid bandId="0"><Value>1.5</Value></Grid>
                 <Grid bandId="1"><Value>2.5</Value></Grid>
                 <Info uri="urn:demo"/>
               </n1:root>"#,
        )
        .unwrap()
    }

    #[test]
    fn child_steps_with_prefix_and_predicate() {
        let doc = sample();
        let path = LocationPath::parse("n1:root/Grid[@bandId='1']/Value").unwrap();
        let nodes = path.select(&doc, &namespaces()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].trimmed_text(), "2.5");
    }

    #[test]
    fn descendant_step_and_positional_predicate() {
        let doc = sample();
        let path = LocationPath::parse("n1:root//Value[2]").unwrap();
        let nodes = path.select(&doc, &namespaces()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].trimmed_text(), "2.5");
    }

    #[test]
    fn attribute_terminal() {
        let path = LocationPath::parse("n1:root/Info/@uri").unwrap();
        assert_eq!(path.terminal(), Some(&Terminal::Attr("uri".to_string())));
        let doc = sample();
        let nodes = path.select(&doc, &namespaces()).unwrap();
        assert_eq!(nodes[0].attr("uri"), Some("urn:demo"));
    }

    #[test]
    fn undeclared_prefix_is_an_error() {
        let doc = sample();
        let path = LocationPath::parse("other:root/Grid").unwrap();
        assert!(matches!(
            path.select(&doc, &BTreeMap::new()),
            Err(AccessorError::MissingConfig(_))
        ));
    }

    #[test]
    fn wildcard_matches_every_child() {
        let doc = sample();
        let path = LocationPath::parse("n1:root/*").unwrap();
        assert_eq!(path.select(&doc, &namespaces()).unwrap().len(), 3);
    }
}
