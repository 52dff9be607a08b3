// src/lib.rs

//! pkgforge
//!
//! Package manager for small, self-contained systems. Packages come from a
//! catalog of JSON descriptors and are installed either from a prebuilt
//! binary archive or built from source through descriptor hooks.
//!
//! # Architecture
//!
//! - Device manifest: one JSON document records the architecture and the
//!   installed `{name, version}` pairs
//! - File lists: every installed package owns a file list and a directory
//!   list, used for removal and ownership queries
//! - Resolver: dependency closure in install order, with build-only
//!   dependencies dropped when a binary will be used
//! - Build pipeline: hooks run into a clean staging root, then docs are
//!   compressed and binaries stripped
//! - Commit last: the manifest is rewritten only after files are in place
//!   and `postinstall` has succeeded

pub mod build;
pub mod config;
mod error;
pub mod fetch;
pub mod install;
pub mod manifest;
pub mod package;
pub mod process;
pub mod resolver;

pub use config::Config;
pub use error::{Error, Result};
pub use install::PackageManager;
