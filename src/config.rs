// src/config.rs

//! Runtime configuration
//!
//! All filesystem locations the package manager touches, plus the switches
//! that shape the build pipeline. The CLI fills this in from flags and
//! environment variables; tests construct it directly.

use crate::package::Architecture;
use std::path::{Path, PathBuf};

/// Default install root
pub const DEFAULT_ROOT: &str = "/";

/// Default directory holding the device manifest and file lists
pub const DEFAULT_STATE_DIR: &str = "/usr/local/etc/pkgforge";

/// Default directory holding package descriptors
pub const DEFAULT_CATALOG_DIR: &str = "/usr/local/lib/pkgforge/packages";

/// Default working directory for downloads, extraction and staging
pub const DEFAULT_WORK_DIR: &str = "/usr/local/tmp/pkgforge";

/// Manifest file name inside the state directory
const MANIFEST_FILE: &str = "device.json";

/// Switches for the build pipeline's post-processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Strip debug symbols from ELF objects and static archives
    pub strip: bool,
    /// Gzip man and info pages
    pub compress_docs: bool,
    /// Run the descriptor's `check` hook after `build`
    pub run_checks: bool,
    /// Leave the working directory in place after the operation
    pub keep_work_dir: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            strip: true,
            compress_docs: true,
            run_checks: false,
            keep_work_dir: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Live filesystem root packages are merged into
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub catalog_dir: PathBuf,
    pub work_dir: PathBuf,
    /// Where build-only archives are written
    pub output_dir: PathBuf,
    /// Platform component of build-only archive names
    pub platform_tag: String,
    /// Program probed before any source build
    pub compiler: String,
    pub strip_program: String,
    /// Architecture used by `init` when creating a fresh manifest; `None`
    /// on hosts with no supported architecture
    pub architecture: Option<Architecture>,
    pub build: BuildOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            catalog_dir: PathBuf::from(DEFAULT_CATALOG_DIR),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            output_dir: PathBuf::from("."),
            platform_tag: "linux".to_string(),
            compiler: "cc".to_string(),
            strip_program: "strip".to_string(),
            architecture: Architecture::host(),
            build: BuildOptions::default(),
        }
    }
}

impl Config {
    /// Configuration with every location rooted under `base`
    ///
    /// Used for self-contained trees (tests, chroots being populated).
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            root: base.join("root"),
            state_dir: base.join("state"),
            catalog_dir: base.join("catalog"),
            work_dir: base.join("work"),
            output_dir: base.join("out"),
            ..Self::default()
        }
    }

    /// Path of the persisted device manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join(MANIFEST_FILE)
    }

    /// Directory holding per-package file and directory lists
    pub fn meta_dir(&self) -> PathBuf {
        self.state_dir.join("meta")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = Config::default();
        assert_eq!(config.root, PathBuf::from("/"));
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("/usr/local/etc/pkgforge/device.json")
        );
        assert_eq!(config.meta_dir(), PathBuf::from("/usr/local/etc/pkgforge/meta"));
        assert!(config.build.strip);
        assert!(config.build.compress_docs);
        assert!(!config.build.keep_work_dir);
    }

    #[test]
    fn test_rooted_at() {
        let config = Config::rooted_at(Path::new("/tmp/x"));
        assert_eq!(config.root, PathBuf::from("/tmp/x/root"));
        assert_eq!(config.manifest_path(), PathBuf::from("/tmp/x/state/device.json"));
    }
}
