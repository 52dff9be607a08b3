// src/install/mod.rs

//! Install, upgrade and remove orchestration
//!
//! [`PackageManager`] composes the resolver, acquisition, the build
//! pipeline and the device manifest. Per package, an install runs:
//!
//! 1. skip if already installed (unless upgrading)
//! 2. fake packages jump straight to step 5
//! 3. acquire the artifact; source builds need a compiler
//! 4. build from source, or stage the extracted binary tree
//! 5. on upgrade, remove the old files
//! 6. merge into the live root and record the file lists
//! 7. run `postinstall`
//! 8. record `{name, version}` and rewrite the manifest
//!
//! The manifest write is last, so any failure before it leaves the
//! manifest as it was.

pub mod merge;
pub mod prompt;
pub mod workdir;

pub use prompt::{AssumeYes, Confirm, LineConfirm, StdioConfirm};
pub use workdir::WorkDir;

use crate::build::{self, BuildPipeline, BuiltPackage, Staged};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{self, Fetcher};
use crate::manifest::{self, filelist, DeviceManifest, FileListStore, FileLists, InstalledPackage};
use crate::package::{Architecture, ArtifactKind, Catalog, HookEnv, OperationContext, Package};
use crate::resolver::Resolver;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// What an install or upgrade request ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Nothing to do: the package is installed and no upgrade was asked
    AlreadyInstalled,
    /// Upgrade requested but the catalog version is the installed one
    UpToDate,
    Installed { version: String },
    Upgraded { from: String, to: String },
}

/// Best-effort removal result
///
/// Removal never fails on individual paths; it records what happened to
/// each of them instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub package: String,
    pub version: String,
    /// Deleted paths in deletion order
    pub removed: Vec<PathBuf>,
    /// Directories left in place because they are not empty or are symlinks
    pub retained: Vec<PathBuf>,
    /// Paths that could not be deleted, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl RemovalReport {
    /// No path failed to delete
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of a bulk upgrade
#[derive(Debug, Default)]
pub struct UpgradeSummary {
    /// `(name, from, to)`
    pub upgraded: Vec<(String, String, String)>,
    pub failed: Vec<(String, Error)>,
}

impl UpgradeSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct PackageManager<'c> {
    config: Config,
    catalog: &'c Catalog,
    manifest: DeviceManifest,
    files: FileListStore,
    fetcher: Fetcher,
    confirm: Box<dyn Confirm + 'c>,
}

impl<'c> PackageManager<'c> {
    /// Load the device manifest and prepare for operations
    ///
    /// Dependency confirmation reads from stdin until replaced with
    /// [`PackageManager::with_confirm`].
    pub fn open(config: Config, catalog: &'c Catalog) -> Result<Self> {
        let manifest = manifest::open(&config.manifest_path())?;
        let files = FileListStore::new(config.meta_dir());
        Ok(Self {
            config,
            catalog,
            manifest,
            files,
            fetcher: Fetcher::new()?,
            confirm: Box::new(StdioConfirm),
        })
    }

    pub fn with_confirm(mut self, confirm: impl Confirm + 'c) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manifest(&self) -> &DeviceManifest {
        &self.manifest
    }

    pub fn architecture(&self) -> Architecture {
        self.manifest.architecture
    }

    pub fn installed(&self) -> &[InstalledPackage] {
        self.manifest.installed()
    }

    /// Every catalog package with the version installed here, if any
    pub fn available(&self) -> Vec<(&'c Package, Option<&str>)> {
        self.catalog
            .iter()
            .map(|pkg| (pkg, self.manifest.installed_version(pkg.name())))
            .collect()
    }

    /// Recorded file lists of an installed package
    pub fn files(&self, name: &str) -> Result<Option<FileLists>> {
        self.files.read(name)
    }

    /// Installed files whose path contains `fragment`, as `(package, path)`
    pub fn owners(&self, fragment: &str) -> Result<Vec<(String, String)>> {
        self.files.owners(fragment)
    }

    fn save_manifest(&self) -> Result<()> {
        self.manifest.save(&self.config.manifest_path())
    }

    /// Install `name` and whatever it is missing
    pub fn install(&mut self, name: &str, build_from_source: bool) -> Result<InstallOutcome> {
        let pkg = self.catalog.get(name)?;
        if self.manifest.is_installed(name) {
            info!("Package {} is already installed", name);
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let ctx = OperationContext {
            build_from_source,
            ..OperationContext::default()
        };
        self.install_dependencies(pkg, ctx)?;
        self.install_package(pkg, ctx)
    }

    /// Upgrade one installed package to its catalog version
    pub fn upgrade(&mut self, name: &str, build_from_source: bool) -> Result<InstallOutcome> {
        let pkg = self.catalog.get(name)?;
        let installed = self
            .manifest
            .installed_version(name)
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;

        if installed == pkg.version() {
            info!("Package {} is up to date ({})", name, installed);
            return Ok(InstallOutcome::UpToDate);
        }

        let ctx = OperationContext {
            build_from_source,
            in_upgrade: true,
            ..OperationContext::default()
        };
        self.install_dependencies(pkg, ctx)?;
        self.install_package(pkg, ctx)
    }

    /// Upgrade every installed package whose catalog version differs
    ///
    /// Dependencies are upgraded before their dependents. A failing package
    /// is recorded and the rest continue, unless the error aborts the run.
    pub fn upgrade_all(&mut self, build_from_source: bool) -> Result<UpgradeSummary> {
        let order = Resolver::new(self.catalog, &self.manifest).upgrade_order();

        let mut candidates = Vec::new();
        for name in order {
            let Ok(pkg) = self.catalog.get(&name) else {
                warn!("Installed package {} is no longer in the catalog", name);
                continue;
            };
            if self.manifest.installed_version(&name) != Some(pkg.version()) {
                candidates.push(name);
            }
        }

        let mut summary = UpgradeSummary::default();
        if candidates.is_empty() {
            info!("All packages are up to date");
            return Ok(summary);
        }
        info!("Packages to upgrade: {}", candidates.join(" "));

        for name in candidates {
            let from = self
                .manifest
                .installed_version(&name)
                .unwrap_or_default()
                .to_string();
            match self.upgrade(&name, build_from_source) {
                Ok(InstallOutcome::Upgraded { from, to }) => {
                    summary.upgraded.push((name, from, to));
                }
                Ok(other) => debug!("Upgrade of {} resulted in {:?}", name, other),
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => {
                    warn!("Upgrade of {} (from {}) failed: {}", name, from, e);
                    summary.failed.push((name, e));
                }
            }
        }

        Ok(summary)
    }

    /// Build `name` from source into a distributable archive
    ///
    /// Missing dependencies (build-only ones included) are installed first.
    /// Nothing about `name` itself is recorded in the manifest.
    pub fn build(&mut self, name: &str) -> Result<BuiltPackage> {
        let pkg = self.catalog.get(name)?;
        let ctx = OperationContext {
            build_from_source: true,
            ..OperationContext::default()
        };
        self.install_dependencies(pkg, ctx)?;
        self.build_archive(pkg, ctx)
            .map_err(|e| Error::for_package(pkg.name(), e))
    }

    fn build_archive(&self, pkg: &Package, ctx: OperationContext) -> Result<BuiltPackage> {
        let arch = self.architecture();
        let work = WorkDir::prepare(&self.config.work_dir, self.config.build.keep_work_dir)?;

        let download = fetch::acquire(&self.fetcher, pkg, arch, true, work.path())?;
        build::ensure_compiler(&self.config.compiler)?;
        let src = fetch::unpack(&download.path, ArtifactKind::Source, work.path())?;

        let staged = BuildPipeline::new(&self.config, arch).build(pkg, &src, ctx)?;
        build::package_staged(
            &staged,
            pkg,
            &self.config.platform_tag,
            arch,
            &self.config.output_dir,
        )
    }

    /// Ask once, then install every missing dependency in resolution order
    fn install_dependencies(&mut self, pkg: &Package, ctx: OperationContext) -> Result<()> {
        let missing = Resolver::new(self.catalog, &self.manifest).missing(pkg, ctx)?;
        if missing.is_empty() {
            return Ok(());
        }

        info!("{} needs: {}", pkg.name(), missing.join(" "));
        let question = format!(
            "Install {} missing dependencies of {} ({})?",
            missing.len(),
            pkg.name(),
            missing.join(", ")
        );
        if !self.confirm.confirm(&question)? {
            return Err(Error::DependenciesDeclined(pkg.name().to_string()));
        }

        for name in missing {
            let dep = self.catalog.get(&name)?;
            self.install_package(dep, OperationContext::default())?;
        }
        Ok(())
    }

    /// Install a single package without looking at its dependencies
    pub fn install_package(&mut self, pkg: &Package, ctx: OperationContext) -> Result<InstallOutcome> {
        self.install_steps(pkg, ctx)
            .map_err(|e| Error::for_package(pkg.name(), e))
    }

    fn install_steps(&mut self, pkg: &Package, ctx: OperationContext) -> Result<InstallOutcome> {
        let name = pkg.name();
        let previous = self.manifest.installed_version(name).map(str::to_string);

        if previous.is_some() && !ctx.in_upgrade {
            info!("Package {} is already installed", name);
            return Ok(InstallOutcome::AlreadyInstalled);
        }
        info!("Installing {} {}", name, pkg.version());

        // Held until postinstall has run
        let mut work_guard = None;

        if pkg.is_fake() {
            debug!("{} is a meta package, no payload", name);
            if ctx.in_upgrade && previous.is_some() {
                self.remove_files(name);
            }
        } else {
            let work = work_guard.insert(WorkDir::prepare(
                &self.config.work_dir,
                self.config.build.keep_work_dir,
            )?);
            let staged = self.stage(pkg, ctx, work)?;

            if ctx.in_upgrade && previous.is_some() {
                let report = self.remove_files(name);
                debug!("Removed {} old paths of {}", report.removed.len(), name);
            }

            merge::merge_tree(&staged, &self.config.root)?;
            self.files.write(name, &staged.lists)?;
        }

        let dest = BuildPipeline::new(&self.config, self.architecture()).staging_dir();
        let env = HookEnv {
            package: name,
            version: pkg.version(),
            build_dir: None,
            dest_dir: &dest,
            root: &self.config.root,
            architecture: self.architecture(),
            context: ctx,
        };
        pkg.hooks()
            .postinstall(&env)
            .map_err(|e| Error::HookFailed {
                hook: "postinstall",
                message: e.to_string(),
            })?;

        self.manifest.record(name, pkg.version());
        self.save_manifest()?;

        Ok(match previous {
            Some(from) if ctx.in_upgrade => {
                info!("Upgraded {} from {} to {}", name, from, pkg.version());
                InstallOutcome::Upgraded {
                    from,
                    to: pkg.version().to_string(),
                }
            }
            _ => {
                info!("Installed {} {}", name, pkg.version());
                InstallOutcome::Installed {
                    version: pkg.version().to_string(),
                }
            }
        })
    }

    /// Acquire and stage the payload of a non-fake package
    fn stage(&self, pkg: &Package, ctx: OperationContext, work: &WorkDir) -> Result<Staged> {
        let arch = self.architecture();
        let download = fetch::acquire(&self.fetcher, pkg, arch, ctx.build_from_source, work.path())?;
        let pipeline = BuildPipeline::new(&self.config, arch);

        if download.is_source() {
            build::ensure_compiler(&self.config.compiler)?;
            let src = fetch::unpack(&download.path, ArtifactKind::Source, work.path())?;
            pipeline.build(pkg, &src, ctx)
        } else {
            let root = fetch::unpack(&download.path, ArtifactKind::Binary, work.path())?;
            pipeline.stage_binary(&root)
        }
    }

    /// Remove an installed package using its recorded file lists
    ///
    /// Returns `None` (with a warning) when the package is not installed.
    /// Individual path failures are collected in the report; the manifest
    /// entry is always dropped once the package was found.
    pub fn remove(&mut self, name: &str) -> Result<Option<RemovalReport>> {
        let Some(version) = self.manifest.installed_version(name).map(str::to_string) else {
            warn!("Package {} is not installed", name);
            return Ok(None);
        };
        info!("Removing {} {}", name, version);

        let mut report = self.remove_files(name);
        report.version = version;

        self.manifest.remove(name);
        self.save_manifest()?;

        if !report.is_clean() {
            warn!(
                "{} paths of {} could not be removed",
                report.failed.len(),
                name
            );
        }
        info!("Removed {} ({} paths deleted)", name, report.removed.len());
        Ok(Some(report))
    }

    /// Delete recorded files, then directories children first, then the
    /// lists themselves
    fn remove_files(&self, name: &str) -> RemovalReport {
        let mut report = RemovalReport {
            package: name.to_string(),
            ..RemovalReport::default()
        };

        let lists = match self.files.read(name) {
            Ok(Some(lists)) => lists,
            Ok(None) => {
                debug!("No file list recorded for {}", name);
                return report;
            }
            Err(e) => {
                report.failed.push((self.files.dir().to_path_buf(), e.to_string()));
                return report;
            }
        };

        for listed in &lists.files {
            let path = filelist::resolve(&self.config.root, listed);
            match fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} already gone", path.display());
                }
                Err(e) => report.failed.push((path, e.to_string())),
            }
        }

        for listed in lists.directories.iter().rev() {
            let path = filelist::resolve(&self.config.root, listed);
            if fs::symlink_metadata(&path).is_ok_and(|m| m.file_type().is_symlink()) {
                report.retained.push(path);
                continue;
            }
            match fs::remove_dir(&path) {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => report.retained.push(path),
                Err(e) => report.failed.push((path, e.to_string())),
            }
        }

        if let Err(e) = self.files.remove(name) {
            report.failed.push((self.files.dir().join(name), e.to_string()));
        }

        report
    }
}
