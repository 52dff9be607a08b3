// src/resolver/mod.rs

//! Dependency resolution
//!
//! Expands a package's transitive dependencies under install-time policy
//! and orders installed packages for bulk upgrades. There is no version
//! solving: every name maps to exactly one catalog descriptor.

use crate::error::Result;
use crate::manifest::DeviceManifest;
use crate::package::{Catalog, Dependency, OperationContext, Package};
use std::collections::HashSet;
use tracing::debug;

pub struct Resolver<'a> {
    catalog: &'a Catalog,
    manifest: &'a DeviceManifest,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a Catalog, manifest: &'a DeviceManifest) -> Self {
        Self { catalog, manifest }
    }

    /// Whether build-only dependencies of `pkg` matter for this operation
    ///
    /// They can be skipped when a prebuilt binary will be used, or when the
    /// package is already installed and is neither being upgraded nor
    /// rebuilt.
    pub fn needs_build_dependencies(&self, pkg: &Package, ctx: OperationContext) -> bool {
        let arch = self.manifest.architecture;
        let uses_binary = pkg.is_binary(arch) && !ctx.build_from_source;
        let untouched = !ctx.in_upgrade
            && !ctx.build_from_source
            && self.manifest.is_installed(pkg.name());
        !(uses_binary || untouched)
    }

    fn selected<'p>(
        &self,
        pkg: &'p Package,
        ctx: OperationContext,
    ) -> impl Iterator<Item = &'p Dependency> {
        let all = self.needs_build_dependencies(pkg, ctx);
        pkg.dependencies()
            .iter()
            .filter(move |dep| all || !dep.is_build_only())
    }

    /// Every dependency of `target`, each listed after its own dependencies
    ///
    /// `ctx` applies to `target` only; dependencies are evaluated with a
    /// fresh context.
    pub fn expand(&self, target: &Package, ctx: OperationContext) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        seen.insert(target.name().to_string());

        let mut order = Vec::new();
        self.visit(target, ctx, &mut seen, &mut order)?;

        debug!(
            "Expanded dependencies of {}: {:?}",
            target.name(),
            order
        );
        Ok(order)
    }

    fn visit(
        &self,
        pkg: &Package,
        ctx: OperationContext,
        seen: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        for dep in self.selected(pkg, ctx) {
            if !seen.insert(dep.name.clone()) {
                continue;
            }
            let dep_pkg = self.catalog.get(&dep.name)?;
            self.visit(dep_pkg, OperationContext::default(), seen, order)?;
            order.push(dep.name.clone());
        }
        Ok(())
    }

    /// Dependencies of `target` that are not installed yet, in install order
    pub fn missing(&self, target: &Package, ctx: OperationContext) -> Result<Vec<String>> {
        Ok(self
            .expand(target, ctx)?
            .into_iter()
            .filter(|name| !self.manifest.is_installed(name))
            .collect())
    }

    /// Installed packages ordered so that each comes after the installed
    /// packages it depends on
    ///
    /// Depth-first topological order over the installed subgraph. A cycle
    /// is broken where it is first re-entered; the package closing the
    /// cycle keeps its manifest position relative to the others.
    pub fn upgrade_order(&self) -> Vec<String> {
        let mut done = HashSet::new();
        let mut active = HashSet::new();
        let mut order = Vec::new();

        for entry in self.manifest.installed() {
            self.visit_installed(&entry.name, &mut active, &mut done, &mut order);
        }
        order
    }

    fn visit_installed(
        &self,
        name: &str,
        active: &mut HashSet<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if done.contains(name) {
            return;
        }
        if !active.insert(name.to_string()) {
            debug!("Dependency cycle through {} while ordering upgrades", name);
            return;
        }

        if let Ok(pkg) = self.catalog.get(name) {
            for dep in pkg.dependencies() {
                if self.manifest.is_installed(&dep.name) {
                    self.visit_installed(&dep.name, active, done, order);
                }
            }
        }

        active.remove(name);
        done.insert(name.to_string());
        order.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::package::{Architecture, Artifact, DependencyTag};

    const ARCH: Architecture = Architecture::X86_64;

    fn binary(name: &str) -> Package {
        Package::new(name, "1.0")
            .with_binary(ARCH, Artifact::new(format!("{name}.tar.xz"), "00"))
            .with_source(Artifact::new(format!("{name}-src.tar.gz"), "11"))
    }

    fn source_only(name: &str) -> Package {
        Package::new(name, "1.0").with_source(Artifact::new(format!("{name}-src.tar.gz"), "11"))
    }

    fn manifest(installed: &[&str]) -> DeviceManifest {
        let mut m = DeviceManifest::new(ARCH);
        for name in installed {
            m.record(name, "1.0");
        }
        m
    }

    fn build_ctx() -> OperationContext {
        OperationContext {
            build_from_source: true,
            ..OperationContext::default()
        }
    }

    #[test]
    fn test_binary_install_skips_build_dependencies() {
        let catalog = Catalog::from_packages([
            binary("p")
                .with_dependency("a", &[])
                .with_dependency("b", &[DependencyTag::Build]),
            binary("a"),
            binary("b"),
        ])
        .unwrap();
        let m = manifest(&[]);
        let resolver = Resolver::new(&catalog, &m);
        let p = catalog.get("p").unwrap();

        assert_eq!(resolver.expand(p, OperationContext::default()).unwrap(), vec!["a"]);
        assert_eq!(resolver.expand(p, build_ctx()).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_source_only_pulls_build_dependencies() {
        let catalog = Catalog::from_packages([
            source_only("p")
                .with_dependency("a", &[])
                .with_dependency("b", &[DependencyTag::Build]),
            binary("a"),
            binary("b"),
        ])
        .unwrap();
        let m = manifest(&[]);
        let resolver = Resolver::new(&catalog, &m);

        let deps = resolver
            .expand(catalog.get("p").unwrap(), OperationContext::default())
            .unwrap();
        assert_eq!(deps, vec!["a", "b"]);
    }

    #[test]
    fn test_installed_source_package_skips_build_dependencies_unless_upgrading() {
        let catalog = Catalog::from_packages([
            source_only("p").with_dependency("b", &[DependencyTag::Build]),
            binary("b"),
        ])
        .unwrap();
        let m = manifest(&["p"]);
        let resolver = Resolver::new(&catalog, &m);
        let p = catalog.get("p").unwrap();

        assert!(resolver.expand(p, OperationContext::default()).unwrap().is_empty());

        let upgrade = OperationContext {
            in_upgrade: true,
            ..OperationContext::default()
        };
        assert_eq!(resolver.expand(p, upgrade).unwrap(), vec!["b"]);
    }

    #[test]
    fn test_diamond_lists_shared_dependency_once() {
        let catalog = Catalog::from_packages([
            binary("p").with_dependency("a", &[]).with_dependency("b", &[]),
            binary("a").with_dependency("c", &[]),
            binary("b").with_dependency("c", &[]),
            binary("c"),
        ])
        .unwrap();
        let m = manifest(&[]);
        let resolver = Resolver::new(&catalog, &m);

        let deps = resolver
            .expand(catalog.get("p").unwrap(), OperationContext::default())
            .unwrap();
        assert_eq!(deps, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_cycle_terminates_and_excludes_target() {
        let catalog = Catalog::from_packages([
            binary("p").with_dependency("a", &[]),
            binary("a").with_dependency("b", &[]),
            binary("b").with_dependency("a", &[]).with_dependency("p", &[]),
        ])
        .unwrap();
        let m = manifest(&[]);
        let resolver = Resolver::new(&catalog, &m);

        let deps = resolver
            .expand(catalog.get("p").unwrap(), OperationContext::default())
            .unwrap();
        assert_eq!(deps, vec!["b", "a"]);
    }

    #[test]
    fn test_missing_filters_installed() {
        let catalog = Catalog::from_packages([
            binary("p").with_dependency("a", &[]).with_dependency("b", &[]),
            binary("a").with_dependency("c", &[]),
            binary("b"),
            binary("c"),
        ])
        .unwrap();
        let m = manifest(&["a", "b"]);
        let resolver = Resolver::new(&catalog, &m);

        let missing = resolver
            .missing(catalog.get("p").unwrap(), OperationContext::default())
            .unwrap();
        assert_eq!(missing, vec!["c"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let catalog = Catalog::from_packages([binary("p").with_dependency("ghost", &[])]).unwrap();
        let m = manifest(&[]);
        let resolver = Resolver::new(&catalog, &m);

        let err = resolver
            .expand(catalog.get("p").unwrap(), OperationContext::default())
            .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound(name) if name == "ghost"));
    }

    #[test]
    fn test_upgrade_order_puts_dependencies_first() {
        let catalog = Catalog::from_packages([
            binary("curl").with_dependency("openssl", &[]).with_dependency("zlib", &[]),
            binary("openssl").with_dependency("zlib", &[]),
            binary("zlib"),
            binary("vim"),
        ])
        .unwrap();
        let m = manifest(&["curl", "vim", "zlib", "openssl"]);
        let resolver = Resolver::new(&catalog, &m);

        assert_eq!(resolver.upgrade_order(), vec!["zlib", "openssl", "curl", "vim"]);
    }

    #[test]
    fn test_upgrade_order_ignores_uninstalled_and_survives_cycles() {
        let catalog = Catalog::from_packages([
            binary("a").with_dependency("b", &[]).with_dependency("x", &[]),
            binary("b").with_dependency("a", &[]),
            binary("x"),
        ])
        .unwrap();
        let m = manifest(&["a", "b", "orphan"]);
        let resolver = Resolver::new(&catalog, &m);

        assert_eq!(resolver.upgrade_order(), vec!["b", "a", "orphan"]);
    }
}
