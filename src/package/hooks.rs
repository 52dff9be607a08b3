// src/package/hooks.rs

//! Descriptor lifecycle hooks
//!
//! The core never looks inside a hook: it calls them in a fixed order and
//! observes success or failure.

use super::{Architecture, OperationContext};
use crate::error::Result;
use crate::process::Cmd;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Everything a hook may need to know about the operation it runs in
#[derive(Debug, Clone, Copy)]
pub struct HookEnv<'a> {
    pub package: &'a str,
    pub version: &'a str,
    /// Unpacked source tree; absent for binary and fake installs
    pub build_dir: Option<&'a Path>,
    /// Staging root the `install` hook populates
    pub dest_dir: &'a Path,
    /// Live filesystem root
    pub root: &'a Path,
    pub architecture: Architecture,
    pub context: OperationContext,
}

impl HookEnv<'_> {
    /// Directory hooks run in: the source tree when there is one
    pub fn working_dir(&self) -> &Path {
        self.build_dir.unwrap_or(self.root)
    }
}

/// Lifecycle callbacks of a package. Every hook defaults to a no-op.
pub trait PackageHooks {
    fn preinstall(&self, _env: &HookEnv) -> Result<()> {
        Ok(())
    }

    fn patch(&self, _env: &HookEnv) -> Result<()> {
        Ok(())
    }

    fn build(&self, _env: &HookEnv) -> Result<()> {
        Ok(())
    }

    fn check(&self, _env: &HookEnv) -> Result<()> {
        Ok(())
    }

    fn install(&self, _env: &HookEnv) -> Result<()> {
        Ok(())
    }

    fn postinstall(&self, _env: &HookEnv) -> Result<()> {
        Ok(())
    }
}

/// Hooks for descriptors that declare none
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl PackageHooks for NoHooks {}

/// Shell snippets declared in a JSON descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSpec {
    pub preinstall: Option<String>,
    pub patch: Option<String>,
    pub build: Option<String>,
    pub check: Option<String>,
    pub install: Option<String>,
    pub postinstall: Option<String>,
}

/// Runs descriptor-declared snippets through `sh -c`
#[derive(Debug, Clone)]
pub struct ScriptHooks {
    scripts: ScriptSpec,
}

impl ScriptHooks {
    pub fn new(scripts: ScriptSpec) -> Self {
        Self { scripts }
    }

    fn run(&self, hook: &str, script: Option<&String>, env: &HookEnv) -> Result<()> {
        let Some(script) = script else {
            return Ok(());
        };
        debug!("Running {} hook for {}", hook, env.package);

        Cmd::new("sh")
            .arg("-c")
            .arg(script)
            .dir(env.working_dir())
            .env("PKGFORGE_PACKAGE", env.package)
            .env("PKGFORGE_VERSION", env.version)
            .env("PKGFORGE_BUILD_DIR", env.working_dir())
            .env("PKGFORGE_DEST_DIR", env.dest_dir)
            .env("PKGFORGE_ROOT", env.root)
            .env("PKGFORGE_ARCH", env.architecture.as_str())
            .run_interactive()?;
        Ok(())
    }
}

impl PackageHooks for ScriptHooks {
    fn preinstall(&self, env: &HookEnv) -> Result<()> {
        self.run("preinstall", self.scripts.preinstall.as_ref(), env)
    }

    fn patch(&self, env: &HookEnv) -> Result<()> {
        self.run("patch", self.scripts.patch.as_ref(), env)
    }

    fn build(&self, env: &HookEnv) -> Result<()> {
        self.run("build", self.scripts.build.as_ref(), env)
    }

    fn check(&self, env: &HookEnv) -> Result<()> {
        self.run("check", self.scripts.check.as_ref(), env)
    }

    fn install(&self, env: &HookEnv) -> Result<()> {
        self.run("install", self.scripts.install.as_ref(), env)
    }

    fn postinstall(&self, env: &HookEnv) -> Result<()> {
        self.run("postinstall", self.scripts.postinstall.as_ref(), env)
    }
}
