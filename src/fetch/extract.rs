// src/fetch/extract.rs

//! Archive extraction
//!
//! Detects the archive kind from the file name and unpacks it into a
//! per-archive directory inside the working directory.

use crate::error::{Error, Result};
use crate::package::ArtifactKind;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;
use xz2::read::XzDecoder;

/// Archive container and compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarXz,
    TarZst,
}

impl ArchiveKind {
    /// Detect the archive kind from the file name
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if name.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveKind::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Ok(ArchiveKind::TarXz)
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Ok(ArchiveKind::TarZst)
        } else if name.ends_with(".tar") {
            Ok(ArchiveKind::Tar)
        } else {
            Err(Error::UnsupportedArchive(path.display().to_string()))
        }
    }
}

/// Extract `archive` into `dest`, creating it if needed
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let kind = ArchiveKind::detect(archive)?;
    debug!("Extracting {} ({:?}) to {}", archive.display(), kind, dest.display());

    fs::create_dir_all(dest)?;
    let file = BufReader::new(File::open(archive)?);

    match kind {
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::Tar => extract_tar(file, dest),
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(file), dest),
        ArchiveKind::TarXz => extract_tar(XzDecoder::new(file), dest),
        ArchiveKind::TarZst => {
            let decoder = zstd::Decoder::with_buffer(file).map_err(|e| {
                Error::ParseError(format!("Failed to create zstd decoder: {}", e))
            })?;
            extract_tar(decoder, dest)
        }
    }
}

/// `tar::Archive::unpack` refuses entries that would escape `dest`
fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(dest)?;
    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        Error::ParseError(format!("Invalid zip archive {}: {}", archive.display(), e))
    })?;
    zip.extract(dest).map_err(|e| {
        Error::ParseError(format!("Failed to extract {}: {}", archive.display(), e))
    })?;
    Ok(())
}

/// Unpack a downloaded payload and return its root
///
/// Binary archives mirror the final filesystem, so the extraction directory
/// is the root. A source archive that holds a single top-level directory is
/// rooted at that directory.
pub fn unpack(archive: &Path, kind: ArtifactKind, work_dir: &Path) -> Result<PathBuf> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let dest = work_dir.join(format!("{}.dir", name));

    if dest.exists() {
        fs::remove_dir_all(&dest)?;
    }
    extract(archive, &dest)?;

    let mut entries = fs::read_dir(&dest)?.collect::<std::io::Result<Vec<_>>>()?;
    if entries.is_empty() {
        return Err(Error::EmptyArchive(archive.to_path_buf()));
    }

    if kind == ArtifactKind::Source && entries.len() == 1 {
        let only = entries.remove(0);
        if only.file_type()?.is_dir() {
            debug!("Source root is {}", only.path().display());
            return Ok(only.path());
        }
    }

    Ok(dest)
}
