// src/package/catalog.rs

//! Package catalog
//!
//! Holds exactly one descriptor per name for the lifetime of the process.

use super::{Package, PackageSpec};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct Catalog {
    packages: BTreeMap<String, Package>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from already constructed descriptors
    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Result<Self> {
        let mut catalog = Self::new();
        for pkg in packages {
            catalog.insert(pkg)?;
        }
        Ok(catalog)
    }

    /// Load every `*.json` descriptor in `dir`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        debug!("Loading package catalog from {}", dir.display());

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut catalog = Self::new();
        for path in paths {
            let content = fs::read_to_string(&path)?;
            let spec: PackageSpec = serde_json::from_str(&content).map_err(|e| {
                Error::ParseError(format!("invalid descriptor {}: {}", path.display(), e))
            })?;
            catalog.insert(Package::from_spec(spec)?)?;
        }

        info!("Loaded {} package descriptors", catalog.len());
        Ok(catalog)
    }

    pub fn insert(&mut self, pkg: Package) -> Result<()> {
        if self.packages.contains_key(pkg.name()) {
            return Err(Error::ParseError(format!(
                "package '{}' is defined more than once",
                pkg.name()
            )));
        }
        self.packages.insert(pkg.name().to_string(), pkg);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Package> {
        self.packages
            .get(name)
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("zlib.json"),
            r#"{"name": "zlib", "version": "1.3.1"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("curl.json"),
            r#"{"name": "curl", "version": "8.9.0", "dependencies": [{"name": "zlib"}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("README"), "not a descriptor").unwrap();

        let catalog = Catalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("curl").unwrap().dependencies()[0].name, "zlib");
        assert!(matches!(
            catalog.get("openssl"),
            Err(Error::PackageNotFound(_))
        ));
    }

    #[test]
    fn test_iter_is_sorted_by_name() {
        let catalog = Catalog::from_packages([
            Package::new("zlib", "1.3.1"),
            Package::new("curl", "8.9.0").with_homepage("https://curl.se"),
        ])
        .unwrap();

        let names: Vec<_> = catalog.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["curl", "zlib"]);
        assert_eq!(catalog.iter().next().unwrap().homepage(), Some("https://curl.se"));
        assert!(!catalog.is_empty());
        assert!(Catalog::new().is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = Catalog::from_packages([Package::new("zlib", "1"), Package::new("zlib", "2")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        assert!(matches!(
            Catalog::load_dir(dir.path()),
            Err(Error::ParseError(_))
        ));
    }
}
