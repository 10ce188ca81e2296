//! Slash-separated hierarchy path helpers.
//!
//! Paths in the harmonized tree are absolute, `/`-separated and never
//! reference a specific filesystem. The empty string addresses the
//! product root.

/// Normalize a path: strip leading/trailing slashes and collapse
/// duplicate separators. `""` and `"/"` both normalize to `""`.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Split a path into its segments. The root path yields no segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join path components, skipping empty ones.
pub fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Split a path into `(parent, name)`. The root path has no name.
pub fn upsplit(path: &str) -> (String, Option<String>) {
    let segs = segments(path);
    match segs.split_last() {
        None => (String::new(), None),
        Some((last, rest)) => (rest.join("/"), Some((*last).to_string())),
    }
}

/// Split a mapping `source_path` into its file-pattern and optional
/// local-path components.
///
/// The split happens at the first `:` not escaped as `\:`; escapes are
/// unescaped in the returned pattern. Everything after the separator is
/// passed to the accessor verbatim.
pub fn split_source_path(source_path: &str) -> (String, Option<String>) {
    let mut pattern = String::with_capacity(source_path.len());
    let mut chars = source_path.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\\' && matches!(chars.peek(), Some((_, ':'))) {
            pattern.push(':');
            chars.next();
            continue;
        }
        if c == ':' {
            return (pattern, Some(source_path[i + 1..].to_string()));
        }
        pattern.push(c);
    }
    (pattern, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_slashes() {
        assert_eq!(normalize("/a/b/"), "a/b");
        assert_eq!(normalize("a//b"), "a/b");
        assert_eq!(normalize("/"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn upsplit_returns_parent_and_name() {
        assert_eq!(
            upsplit("measurements/radiance"),
            ("measurements".to_string(), Some("radiance".to_string()))
        );
        assert_eq!(upsplit("top"), (String::new(), Some("top".to_string())));
        assert_eq!(upsplit(""), (String::new(), None));
    }

    #[test]
    fn source_path_splits_at_first_colon() {
        assert_eq!(
            split_source_path("measurement.*\\.dat:0:16:16"),
            ("measurement.*\\.dat".to_string(), Some("0:16:16".to_string()))
        );
        assert_eq!(split_source_path("manifest\\.safe"), ("manifest\\.safe".to_string(), None));
    }

    #[test]
    fn source_path_keeps_multibyte_characters() {
        assert_eq!(
            split_source_path("Ä\\.dat:0:3:3"),
            ("Ä\\.dat".to_string(), Some("0:3:3".to_string()))
        );
        assert_eq!(split_source_path("größe\\.xml"), ("größe\\.xml".to_string(), None));
    }

    #[test]
    fn source_path_honors_escapes() {
        assert_eq!(
            split_source_path("odd\\:name\\.xml:/a/b"),
            ("odd:name\\.xml".to_string(), Some("/a/b".to_string()))
        );
    }
}
