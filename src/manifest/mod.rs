// src/manifest/mod.rs

//! Device manifest
//!
//! The manifest is the only authority on what is installed. It is loaded
//! once, mutated in memory and rewritten in full after every change:
//! - `architecture`: the target architecture of this device
//! - `installed_packages`: ordered `{name, version}` entries, one per name

pub mod filelist;

pub use filelist::{FileListStore, FileLists};

use crate::error::{Error, Result};
use crate::package::Architecture;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceManifest {
    pub architecture: Architecture,
    #[serde(default)]
    installed_packages: Vec<InstalledPackage>,
}

/// Create the manifest at `path` if it does not exist yet
///
/// Idempotent: an existing manifest is loaded and returned untouched.
pub fn init(path: &Path, architecture: Architecture) -> Result<DeviceManifest> {
    debug!("Initializing device manifest at: {}", path.display());

    if path.exists() {
        return open(path);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let manifest = DeviceManifest::new(architecture);
    manifest.save(path)?;

    info!("Device manifest initialized for {}", architecture);
    Ok(manifest)
}

/// Load an existing manifest
pub fn open(path: &Path) -> Result<DeviceManifest> {
    if !path.exists() {
        return Err(Error::ManifestNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)?;
    let manifest: DeviceManifest = serde_json::from_str(&content)?;

    let mut seen = HashSet::new();
    for entry in &manifest.installed_packages {
        if !seen.insert(entry.name.as_str()) {
            return Err(Error::ParseError(format!(
                "{} lists package '{}' more than once",
                path.display(),
                entry.name
            )));
        }
    }

    Ok(manifest)
}

impl DeviceManifest {
    pub fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            installed_packages: Vec::new(),
        }
    }

    /// Rewrite the manifest as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)?;

        debug!(
            "Wrote device manifest ({} packages) to {}",
            self.installed_packages.len(),
            path.display()
        );
        Ok(())
    }

    pub fn installed(&self) -> &[InstalledPackage] {
        &self.installed_packages
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&InstalledPackage> {
        self.installed_packages.iter().find(|p| p.name == name)
    }

    pub fn installed_version(&self, name: &str) -> Option<&str> {
        self.get(name).map(|p| p.version.as_str())
    }

    /// Append an entry, dropping any previous entry with the same name
    pub fn record(&mut self, name: &str, version: &str) {
        self.remove(name);
        self.installed_packages.push(InstalledPackage {
            name: name.to_string(),
            version: version.to_string(),
        });
    }

    /// Filter out the entry for `name`; returns whether one existed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.installed_packages.len();
        self.installed_packages.retain(|p| p.name != name);
        self.installed_packages.len() != before
    }
}
