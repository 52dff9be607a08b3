// src/package/mod.rs

//! Package descriptors
//!
//! A [`Package`] is catalog data plus a set of lifecycle hooks. It is never
//! mutated during an operation; per-operation state lives in
//! [`OperationContext`] and is passed next to the descriptor.

pub mod catalog;
pub mod hooks;

pub use catalog::Catalog;
pub use hooks::{HookEnv, NoHooks, PackageHooks, ScriptHooks, ScriptSpec};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Target CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "i686")]
    I686,
    #[serde(rename = "armv7l")]
    Armv7l,
    #[serde(rename = "aarch64")]
    Aarch64,
}

impl Architecture {
    pub fn as_str(&self) -> &str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::I686 => "i686",
            Architecture::Armv7l => "armv7l",
            Architecture::Aarch64 => "aarch64",
        }
    }

    /// Architecture of the running machine, if it is a supported one
    pub fn host() -> Option<Self> {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    fn from_rust_arch(arch: &str) -> Option<Self> {
        match arch {
            "x86_64" => Some(Architecture::X86_64),
            "x86" => Some(Architecture::I686),
            "arm" => Some(Architecture::Armv7l),
            "aarch64" => Some(Architecture::Aarch64),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Architecture::X86_64),
            "i686" => Ok(Architecture::I686),
            "armv7l" => Ok(Architecture::Armv7l),
            "aarch64" => Ok(Architecture::Aarch64),
            _ => Err(format!("Invalid architecture: {}", s)),
        }
    }
}

/// Dependency tag. `build` marks a dependency needed only when compiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyTag {
    Build,
}

/// A named dependency and its tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<DependencyTag>,
}

impl Dependency {
    pub fn is_build_only(&self) -> bool {
        self.tags.contains(&DependencyTag::Build)
    }
}

/// Downloadable payload location and its expected SHA-256
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub url: String,
    pub sha256: String,
}

impl Artifact {
    pub fn new(url: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sha256: sha256.into(),
        }
    }
}

/// Which payload an acquisition chose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Binary,
    Source,
}

/// Per-operation flags that used to live on the descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationContext {
    /// Ignore prebuilt binaries and compile from source
    pub build_from_source: bool,
    /// The package is being replaced by a different version
    pub in_upgrade: bool,
    /// The build pipeline is running for this package
    pub in_build: bool,
}

/// On-disk descriptor format (one JSON document per package)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub binary: BTreeMap<Architecture, Artifact>,
    #[serde(default)]
    pub source: Option<Artifact>,
    #[serde(default)]
    pub is_fake: bool,
    #[serde(default)]
    pub hooks: ScriptSpec,
}

/// A catalog entry: metadata, artifact locations and lifecycle hooks
pub struct Package {
    name: String,
    version: String,
    description: Option<String>,
    homepage: Option<String>,
    dependencies: Vec<Dependency>,
    binaries: BTreeMap<Architecture, Artifact>,
    source: Option<Artifact>,
    fake: bool,
    hooks: Box<dyn PackageHooks>,
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .field("binaries", &self.binaries)
            .field("source", &self.source)
            .field("fake", &self.fake)
            .finish_non_exhaustive()
    }
}

impl Package {
    /// Create a descriptor with no dependencies, artifacts or hooks
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            homepage: None,
            dependencies: Vec::new(),
            binaries: BTreeMap::new(),
            source: None,
            fake: false,
            hooks: Box::new(NoHooks),
        }
    }

    /// Build a descriptor from its JSON form, wiring script hooks
    pub fn from_spec(spec: PackageSpec) -> Result<Self> {
        if spec.name.trim().is_empty() {
            return Err(Error::ParseError("package name is empty".to_string()));
        }
        if spec.version.trim().is_empty() {
            return Err(Error::ParseError(format!(
                "package '{}' has an empty version",
                spec.name
            )));
        }

        let mut seen = BTreeSet::new();
        for dep in &spec.dependencies {
            if !seen.insert(dep.name.as_str()) {
                return Err(Error::ParseError(format!(
                    "package '{}' lists dependency '{}' twice",
                    spec.name, dep.name
                )));
            }
        }

        Ok(Self {
            name: spec.name,
            version: spec.version,
            description: spec.description,
            homepage: spec.homepage,
            dependencies: spec.dependencies,
            binaries: spec.binary,
            source: spec.source,
            fake: spec.is_fake,
            hooks: Box::new(ScriptHooks::new(spec.hooks)),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_homepage(mut self, homepage: impl Into<String>) -> Self {
        self.homepage = Some(homepage.into());
        self
    }

    /// Add a dependency, replacing any earlier entry with the same name
    pub fn with_dependency(mut self, name: impl Into<String>, tags: &[DependencyTag]) -> Self {
        let name = name.into();
        self.dependencies.retain(|d| d.name != name);
        self.dependencies.push(Dependency {
            name,
            tags: tags.iter().copied().collect(),
        });
        self
    }

    pub fn with_binary(mut self, arch: Architecture, artifact: Artifact) -> Self {
        self.binaries.insert(arch, artifact);
        self
    }

    pub fn with_source(mut self, artifact: Artifact) -> Self {
        self.source = Some(artifact);
        self
    }

    /// Mark as a meta package with no payload
    pub fn fake(mut self) -> Self {
        self.fake = true;
        self
    }

    pub fn with_hooks(mut self, hooks: impl PackageHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn homepage(&self) -> Option<&str> {
        self.homepage.as_deref()
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn hooks(&self) -> &dyn PackageHooks {
        self.hooks.as_ref()
    }

    pub fn is_fake(&self) -> bool {
        self.fake
    }

    /// A prebuilt binary exists for `arch`
    pub fn is_binary(&self, arch: Architecture) -> bool {
        self.binaries.contains_key(&arch)
    }

    /// Installing on `arch` means compiling
    pub fn is_source(&self, arch: Architecture) -> bool {
        !(self.is_binary(arch) || self.fake)
    }

    pub fn binary(&self, arch: Architecture) -> Option<&Artifact> {
        self.binaries.get(&arch)
    }

    pub fn source(&self) -> Option<&Artifact> {
        self.source.as_ref()
    }

    /// Choose the payload to acquire: the binary for `arch` unless there is
    /// none or a source build was requested, otherwise the source.
    pub fn artifact_for(
        &self,
        arch: Architecture,
        build_from_source: bool,
    ) -> Option<(ArtifactKind, &Artifact)> {
        match self.binaries.get(&arch) {
            Some(binary) if !build_from_source => Some((ArtifactKind::Binary, binary)),
            _ => self.source.as_ref().map(|s| (ArtifactKind::Source, s)),
        }
    }
}
