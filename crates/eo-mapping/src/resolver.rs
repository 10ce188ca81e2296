//! Source-path resolution against a legacy product's file listing.

use regex::Regex;

use crate::error::{MappingError, Result};

/// Resolve a file pattern to the unique matching relative path.
///
/// Zero matches and multiple matches are both errors; an ambiguous
/// layout must be disambiguated by tightening the pattern.
pub fn resolve(listing: &[String], pattern: &str) -> Result<String> {
    let regex = Regex::new(pattern).map_err(|err| {
        MappingError::InvalidConfig(format!("source pattern '{pattern}' is not a valid regex: {err}"))
    })?;
    let mut matches = listing.iter().filter(|path| regex.is_match(path));
    let first = matches
        .next()
        .ok_or_else(|| MappingError::ResourceNotFound(pattern.to_string()))?;
    let extra = matches.count();
    if extra > 0 {
        return Err(MappingError::AmbiguousMapping {
            pattern: pattern.to_string(),
            count: extra + 1,
        });
    }
    Ok(first.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Vec<String> {
        [
            "GRANULE/L1C_T32TQM/MTD_TL.xml",
            "GRANULE/L1C_T32TQM/IMG_DATA/T32TQM_B02.jp2",
            "GRANULE/L1C_T32TQM/IMG_DATA/T32TQM_B03.jp2",
            "MTD_MSIL1C.xml",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn unique_match_resolves() {
        let path = resolve(&listing(), r"IMG_DATA/.*_B02\.jp2$").unwrap();
        assert_eq!(path, "GRANULE/L1C_T32TQM/IMG_DATA/T32TQM_B02.jp2");
    }

    #[test]
    fn zero_matches_is_resource_not_found() {
        assert!(matches!(
            resolve(&listing(), r".*_B08\.jp2$"),
            Err(MappingError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn several_matches_are_ambiguous() {
        assert!(matches!(
            resolve(&listing(), r".*\.jp2$"),
            Err(MappingError::AmbiguousMapping { count: 2, .. })
        ));
    }

    #[test]
    fn broken_pattern_is_invalid_config() {
        assert!(matches!(
            resolve(&listing(), "("),
            Err(MappingError::InvalidConfig(_))
        ));
    }
}
