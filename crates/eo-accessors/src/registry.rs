//! Name-to-implementation accessor lookup.
//!
//! The mapping engine only ever sees `item_format` strings; this
//! registry turns them into opened accessors. Builders receive the
//! resolved physical path and the entry's (already resolved)
//! `accessor_config` dictionary.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{AccessorError, Result};
use crate::FormatAccessor;

/// Open-time keyword values for one accessor, fully resolved.
pub type AccessorConfig = Map<String, Value>;

type Builder = Box<dyn Fn(&Path, &AccessorConfig) -> Result<Box<dyn FormatAccessor>> + Send + Sync>;

/// Registry mapping `item_format` names to accessor builders.
pub struct AccessorRegistry {
    builders: BTreeMap<String, Builder>,
}

impl AccessorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { builders: BTreeMap::new() }
    }

    /// Registry pre-populated with every built-in accessor.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("binary", |path, config| {
            Ok(Box::new(crate::binary::BinaryAccessor::open(path, config)?))
        });
        registry.register("xml", |path, config| {
            Ok(Box::new(crate::xml::XmlAccessor::open(path, config)?))
        });
        registry.register("xmlangles", |path, config| {
            Ok(Box::new(crate::angles::XmlAnglesAccessor::open(path, config)?))
        });
        registry.register("xmltp", |path, config| {
            Ok(Box::new(crate::angles::XmlTiePointAccessor::open(path, config)?))
        });
        registry.register("xmlmetadata", |path, config| {
            Ok(Box::new(crate::metadata::XmlMetadataAccessor::open(path, config)?))
        });
        registry.register("grib", |path, config| {
            Ok(Box::new(crate::grib::GribAccessor::open(path, config)?))
        });
        registry.register("netcdf", |path, config| {
            Ok(Box::new(crate::netcdf::NetcdfAccessor::open(path, config)?))
        });
        registry.register("raster", |path, config| {
            Ok(Box::new(crate::raster::RasterAccessor::open(path, config)?))
        });
        registry.register("zarr", |path, config| {
            Ok(Box::new(crate::gridded::GriddedAccessor::open(path, config)?))
        });
        registry.register("bytes", |path, config| {
            Ok(Box::new(crate::passthrough::PassthroughAccessor::open(path, config)?))
        });
        registry
    }

    /// Register (or replace) a builder for `item_format`.
    pub fn register<F>(&mut self, item_format: &str, builder: F)
    where
        F: Fn(&Path, &AccessorConfig) -> Result<Box<dyn FormatAccessor>> + Send + Sync + 'static,
    {
        self.builders.insert(item_format.to_string(), Box::new(builder));
    }

    pub fn contains(&self, item_format: &str) -> bool {
        self.builders.contains_key(item_format)
    }

    /// Registered format names, sorted.
    pub fn formats(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Open an accessor of the named format over `path`.
    pub fn open(
        &self,
        item_format: &str,
        path: &Path,
        config: &AccessorConfig,
    ) -> Result<Box<dyn FormatAccessor>> {
        let builder = self
            .builders
            .get(item_format)
            .ok_or_else(|| AccessorError::UnknownFormat(item_format.to_string()))?;
        builder(path, config)
    }
}

impl Default for AccessorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
