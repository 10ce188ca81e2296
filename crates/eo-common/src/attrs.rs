//! Attribute dictionaries.
//!
//! Attributes are CF-convention-compatible key/value pairs carried on
//! products, groups and variables. They are kept as JSON maps so they
//! serialize unchanged into store metadata.

use serde_json::{Map, Value};

/// An attribute dictionary (string keys, JSON values).
pub type Attributes = Map<String, Value>;

/// Shallow-merge `declared` over `base`; declared keys win on conflict.
pub fn merge_attrs(base: &mut Attributes, declared: &Attributes) {
    for (key, value) in declared {
        base.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declared_keys_win() {
        let mut base = Attributes::new();
        base.insert("units".to_string(), json!("counts"));
        base.insert("scale".to_string(), json!(1.0));

        let mut declared = Attributes::new();
        declared.insert("units".to_string(), json!("W.m-2"));

        merge_attrs(&mut base, &declared);
        assert_eq!(base["units"], json!("W.m-2"));
        assert_eq!(base["scale"], json!(1.0));
    }
}
