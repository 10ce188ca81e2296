//! Read-only file listing of a legacy product.
//!
//! A legacy product is an opaque directory tree (SAFE package, GRIB
//! delivery, ...). The mapping layer only ever needs its relative file
//! listing and a way to turn a relative path back into a real one; this
//! trait is that boundary.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Relative-path view over a legacy product.
pub trait FileListing {
    /// Product name (the root directory name, recognition input).
    fn name(&self) -> &str;

    /// All relative file paths, `/`-separated, in stable order.
    fn relative_paths(&self) -> io::Result<Vec<String>>;

    /// Absolute path for a relative entry.
    fn resolve(&self, relative: &str) -> PathBuf;
}

/// Directory-backed [`FileListing`].
#[derive(Debug, Clone)]
pub struct DirListing {
    root: PathBuf,
    name: String,
}

impl DirListing {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("legacy product directory not found: {}", root.display()),
            ));
        }
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { root, name })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileListing for DirListing {
    fn name(&self) -> &str {
        &self.name
    }

    fn relative_paths(&self) -> io::Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .expect("walkdir entry under root");
            paths.push(rel.to_string_lossy().replace('\\', "/"));
        }
        Ok(paths)
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn lists_relative_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.dat"), b"x").unwrap();
        fs::write(dir.path().join("a.xml"), b"y").unwrap();

        let listing = DirListing::new(dir.path()).unwrap();
        let paths = listing.relative_paths().unwrap();
        assert_eq!(paths, vec!["a.xml".to_string(), "sub/b.dat".to_string()]);
        assert!(listing.resolve("a.xml").ends_with("a.xml"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(DirListing::new("/nonexistent/product").is_err());
    }
}
