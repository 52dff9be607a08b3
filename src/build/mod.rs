// src/build/mod.rs

//! Build pipeline
//!
//! Turns an unpacked source tree into a staged filesystem payload:
//! preinstall → patch → build → (check) → install into a clean staging root
//! → compress docs → strip → record file lists.
//!
//! The staged payload is either merged into the live root by the installer
//! or packaged into a distributable archive (see [`archive`]).

pub mod archive;
pub mod postprocess;

pub use archive::{package_staged, BuiltPackage};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::manifest::FileLists;
use crate::package::{Architecture, HookEnv, OperationContext, Package};
use crate::process;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Metadata files a prebuilt archive may carry at its root
const ARCHIVE_METADATA: [&str; 2] = ["filelist", "dlist"];

/// A payload ready to be merged or archived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged {
    pub root: PathBuf,
    pub lists: FileLists,
}

/// Fail unless the configured compiler is on PATH
pub fn ensure_compiler(compiler: &str) -> Result<()> {
    if process::exists(compiler) {
        Ok(())
    } else {
        Err(Error::MissingCompiler(compiler.to_string()))
    }
}

/// Run one hook, turning any failure into [`Error::HookFailed`]
fn run_hook(hook: &'static str, f: impl FnOnce() -> Result<()>) -> Result<()> {
    debug!("Running {} hook", hook);
    f().map_err(|e| Error::HookFailed {
        hook,
        message: e.to_string(),
    })
}

pub struct BuildPipeline<'a> {
    config: &'a Config,
    architecture: Architecture,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(config: &'a Config, architecture: Architecture) -> Self {
        Self {
            config,
            architecture,
        }
    }

    /// Staging root the `install` hook writes into
    pub fn staging_dir(&self) -> PathBuf {
        self.config.work_dir.join("dest")
    }

    /// Build `pkg` from the source tree at `build_root`
    pub fn build(&self, pkg: &Package, build_root: &Path, ctx: OperationContext) -> Result<Staged> {
        info!("Building {} {} from source", pkg.name(), pkg.version());

        let ctx = OperationContext {
            in_build: true,
            ..ctx
        };
        let dest = self.staging_dir();
        let env = HookEnv {
            package: pkg.name(),
            version: pkg.version(),
            build_dir: Some(build_root),
            dest_dir: &dest,
            root: &self.config.root,
            architecture: self.architecture,
            context: ctx,
        };
        let hooks = pkg.hooks();

        run_hook("preinstall", || hooks.preinstall(&env))?;
        run_hook("patch", || hooks.patch(&env))?;
        run_hook("build", || hooks.build(&env))?;
        if self.config.build.run_checks {
            run_hook("check", || hooks.check(&env))?;
        }

        clear_dir(&dest)?;
        run_hook("install", || hooks.install(&env))?;

        self.postprocess(&dest)?;

        let lists = FileLists::from_tree(&dest)?;
        info!(
            "Staged {} files and {} directories for {}",
            lists.files.len(),
            lists.directories.len(),
            pkg.name()
        );
        Ok(Staged { root: dest, lists })
    }

    /// Compress docs and strip binaries according to the build options
    pub fn postprocess(&self, root: &Path) -> Result<()> {
        if self.config.build.compress_docs {
            let count = postprocess::compress_docs(root)?;
            debug!("Compressed {} documentation files", count);
        }
        if self.config.build.strip {
            let count = postprocess::strip_binaries(root, &self.config.strip_program)?;
            debug!("Stripped {} binaries", count);
        }
        Ok(())
    }

    /// Treat an extracted binary archive as the staged payload
    pub fn stage_binary(&self, root: &Path) -> Result<Staged> {
        for name in ARCHIVE_METADATA {
            let path = root.join(name);
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        let lists = FileLists::from_tree(root)?;
        Ok(Staged {
            root: root.to_path_buf(),
            lists,
        })
    }
}

/// Remove and recreate `dir`
fn clear_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(dir)?;
    Ok(())
}
