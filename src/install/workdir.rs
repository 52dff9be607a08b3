// src/install/workdir.rs

//! Working directory guard
//!
//! Downloads, extraction and staging share one working directory. The guard
//! wipes it when dropped, so cleanup runs on every exit path of an install
//! or build attempt, including early returns through `?`.

use crate::error::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    /// Create the directory (if needed) and arm the cleanup
    pub fn prepare(path: &Path, keep: bool) -> Result<Self> {
        fs::create_dir_all(path)?;
        debug!("Using work directory {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep {
            info!("Keeping work directory {}", self.path.display());
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed work directory {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to clean work directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
