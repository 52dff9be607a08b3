// src/fetch/mod.rs

//! Artifact acquisition
//!
//! This module provides functionality for:
//! - Choosing between a package's binary and source payload
//! - Downloading with resume and retry support
//! - Verifying SHA-256 checksums
//! - Unpacking archives into a build root (see [`extract`])

pub mod extract;

pub use extract::{unpack, ArchiveKind};

use crate::error::{Error, Result};
use crate::package::{Architecture, ArtifactKind, Package};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum attempts for a failed transfer
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Read buffer for streamed downloads
const CHUNK_SIZE: usize = 64 * 1024;

/// A verified payload sitting in the working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl Download {
    pub fn is_source(&self) -> bool {
        self.kind == ArtifactKind::Source
    }
}

/// HTTP client wrapper with retry and resume support
pub struct Fetcher {
    client: Client,
    max_retries: u32,
}

impl Fetcher {
    /// Create a new fetcher
    ///
    /// Certificates are not verified and no request timeout is set.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Fetch `url` into `dest`
    ///
    /// `file://` URLs and bare paths are copied. HTTP transfers land in a
    /// `.part` file first, so an interrupted transfer continues where it
    /// stopped on the next attempt.
    pub fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Some(local) = local_path(url) {
            fs::copy(&local, dest).map_err(|e| {
                Error::DownloadError(format!("Failed to copy {}: {}", local.display(), e))
            })?;
            return Ok(());
        }

        let partial = partial_path(dest);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(url, &partial) {
                Ok(()) => break,
                Err(Error::DownloadError(msg)) => return Err(Error::DownloadError(msg)),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }

        fs::rename(&partial, dest)?;
        info!("Successfully downloaded to {}", dest.display());
        Ok(())
    }

    fn fetch_once(&self, url: &str, partial: &Path) -> Result<()> {
        let existing = fs::metadata(partial).map(|m| m.len()).unwrap_or(0);

        let mut request = self.client.get(url);
        if existing > 0 {
            debug!("Resuming {} from byte {}", url, existing);
            request = request.header(RANGE, format!("bytes={}-", existing));
        }

        let mut response = request.send()?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && existing > 0 {
            debug!("{} already fully downloaded", url);
            return Ok(());
        }
        if !status.is_success() {
            return Err(Error::DownloadError(format!("HTTP {} from {}", status, url)));
        }

        let resumed = status == StatusCode::PARTIAL_CONTENT;
        let mut file = if resumed {
            OpenOptions::new().append(true).open(partial)?
        } else {
            File::create(partial)?
        };

        let offset = if resumed { existing } else { 0 };
        let total = response.content_length().map(|len| len + offset);
        copy_with_progress(&mut response, &mut file, offset, total)?;
        file.flush()?;
        Ok(())
    }
}

fn copy_with_progress(
    reader: &mut impl Read,
    writer: &mut impl Write,
    offset: u64,
    total: Option<u64>,
) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = offset;
    let mut last_reported = 0;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        written += n as u64;

        if let Some(total) = total.filter(|t| *t > 0) {
            let percent = written * 100 / total;
            if percent >= last_reported + 10 {
                last_reported = percent - percent % 10;
                debug!("Downloaded {}% ({} of {} bytes)", percent, written, total);
            }
        }
    }

    Ok(written)
}

/// Local path for `file://` URLs and bare paths
fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        Some(PathBuf::from(path))
    } else if url.contains("://") {
        None
    } else {
        Some(PathBuf::from(url))
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Last path segment of a URL, ignoring any query or fragment
pub fn filename_from_url(url: &str) -> Option<&str> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}

/// Compute the hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify file checksum matches expected value
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    debug!("Verifying checksum for {}", path.display());

    let actual = sha256_file(path)?;
    let expected = expected.trim().to_ascii_lowercase();

    if actual != expected {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    debug!("Checksum verified: {}", expected);
    Ok(())
}

/// Download and verify the payload `pkg` needs on `arch`
///
/// The binary is preferred unless there is none for `arch` or
/// `build_from_source` is set. A file already in `work_dir` with the right
/// checksum is reused.
pub fn acquire(
    fetcher: &Fetcher,
    pkg: &Package,
    arch: Architecture,
    build_from_source: bool,
    work_dir: &Path,
) -> Result<Download> {
    let (kind, artifact) =
        pkg.artifact_for(arch, build_from_source)
            .ok_or_else(|| Error::NoArtifact {
                package: pkg.name().to_string(),
                architecture: arch.to_string(),
            })?;

    let default_name = format!("{}-{}", pkg.name(), pkg.version());
    let filename = filename_from_url(&artifact.url).unwrap_or(&default_name);
    let path = work_dir.join(filename);

    if path.exists() && verify_checksum(&path, &artifact.sha256).is_ok() {
        info!("Using cached {}", path.display());
    } else {
        if path.exists() {
            fs::remove_file(&path)?;
        }
        fetcher.fetch(&artifact.url, &path)?;
        verify_checksum(&path, &artifact.sha256)?;
    }

    Ok(Download { kind, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Artifact;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello");
        fs::write(&path, "hello").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn test_verify_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello");
        fs::write(&path, "hello").unwrap();

        assert!(verify_checksum(&path, &HELLO_SHA256.to_uppercase()).is_ok());
        let err = verify_checksum(&path, "deadbeef").unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { ref actual, .. } if actual == HELLO_SHA256));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/dl/zlib-1.3.1.tar.gz?raw=1"),
            Some("zlib-1.3.1.tar.gz")
        );
        assert_eq!(filename_from_url("https://example.com/"), None);
        assert_eq!(filename_from_url("file:///srv/pkgs/a.zip"), Some("a.zip"));
    }

    #[test]
    fn test_local_path() {
        assert_eq!(local_path("file:///srv/a.tar"), Some(PathBuf::from("/srv/a.tar")));
        assert_eq!(local_path("/srv/a.tar"), Some(PathBuf::from("/srv/a.tar")));
        assert_eq!(local_path("https://example.com/a.tar"), None);
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/w/zlib.tar.gz")),
            PathBuf::from("/w/zlib.tar.gz.part")
        );
    }

    #[test]
    fn test_copy_with_progress() {
        let data = vec![7u8; 200_000];
        let mut out = Vec::new();
        let written = copy_with_progress(&mut data.as_slice(), &mut out, 10, Some(200_010)).unwrap();
        assert_eq!(written, 200_010);
        assert_eq!(out.len(), 200_000);
    }

    #[test]
    fn test_acquire_local_source() {
        let src = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let artifact_path = src.path().join("hello-1.0.tar.gz");
        fs::write(&artifact_path, "hello").unwrap();

        let pkg = Package::new("hello", "1.0").with_source(Artifact::new(
            format!("file://{}", artifact_path.display()),
            HELLO_SHA256,
        ));

        let fetcher = Fetcher::new().unwrap();
        let download = acquire(&fetcher, &pkg, Architecture::X86_64, false, work.path()).unwrap();
        assert!(download.is_source());
        assert_eq!(download.path, work.path().join("hello-1.0.tar.gz"));
        assert!(download.path.exists());
    }

    #[test]
    fn test_acquire_checksum_mismatch() {
        let src = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let artifact_path = src.path().join("hello.tar.gz");
        fs::write(&artifact_path, "tampered").unwrap();

        let pkg = Package::new("hello", "1.0").with_binary(
            Architecture::X86_64,
            Artifact::new(artifact_path.display().to_string(), HELLO_SHA256),
        );

        let fetcher = Fetcher::new().unwrap();
        let err = acquire(&fetcher, &pkg, Architecture::X86_64, false, work.path()).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_acquire_no_artifact() {
        let work = tempfile::tempdir().unwrap();
        let pkg = Package::new("hello", "1.0")
            .with_binary(Architecture::Aarch64, Artifact::new("x.tar", "00"));

        let fetcher = Fetcher::new().unwrap();
        let err = acquire(&fetcher, &pkg, Architecture::X86_64, false, work.path()).unwrap_err();
        assert!(matches!(err, Error::NoArtifact { ref architecture, .. } if architecture == "x86_64"));
    }
}
