// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for pkgforge
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed manifest or descriptor JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Device manifest not found
    #[error("Device manifest not found at path: {0} (run `pkgforge init` first)")]
    ManifestNotFound(PathBuf),

    /// Package is not in the catalog
    #[error("Package '{0}' not found in catalog")]
    PackageNotFound(String),

    /// Package is not recorded in the device manifest
    #[error("Package '{0}' is not installed")]
    NotInstalled(String),

    /// Neither a binary nor a source artifact exists for this architecture
    #[error("No binary or source artifact for '{package}' on {architecture}")]
    NoArtifact {
        package: String,
        architecture: String,
    },

    /// Downloaded artifact does not match the recorded digest
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Extraction produced no entries
    #[error("Archive {0} is empty")]
    EmptyArchive(PathBuf),

    /// Archive kind not recognized from its file name
    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(String),

    /// Transfer failed
    #[error("Download error: {0}")]
    DownloadError(String),

    /// No working compiler for a source build
    #[error("No working compiler found ('{0}' is not on PATH); install a toolchain before building from source")]
    MissingCompiler(String),

    /// A descriptor lifecycle hook signalled failure
    #[error("{hook} hook failed: {message}")]
    HookFailed { hook: &'static str, message: String },

    /// An external step exited unsuccessfully
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Operator did not confirm dependency installation
    #[error("Installation of dependencies for '{0}' was declined")]
    DependenciesDeclined(String),

    /// Package-scoped wrapper raised at the orchestrator boundary
    #[error("Failed to install '{package}': {source}")]
    InstallFailed {
        package: String,
        #[source]
        source: Box<Error>,
    },

    /// Parse errors for descriptors, lists and archive names
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl Error {
    /// Wrap an error with the package it happened for
    pub fn for_package(package: &str, err: Error) -> Self {
        match err {
            Error::InstallFailed { .. } | Error::DependenciesDeclined(_) => err,
            other => Error::InstallFailed {
                package: package.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Whether this error should stop a batch run instead of moving on to
    /// the next requested package.
    pub fn aborts_run(&self) -> bool {
        match self {
            Error::DependenciesDeclined(_)
            | Error::ManifestNotFound(_)
            | Error::MissingCompiler(_) => true,
            Error::InstallFailed { source, .. } => source.aborts_run(),
            _ => false,
        }
    }
}

/// Result type alias using pkgforge's Error type
pub type Result<T> = std::result::Result<T, Error>;
