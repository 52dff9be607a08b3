// src/build/postprocess.rs

//! Staged tree post-processing: documentation compression and symbol
//! stripping

use crate::error::{Error, Result};
use crate::process::{self, Cmd};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const ELF_MAGIC: &[u8] = b"\x7fELF";
const AR_MAGIC: &[u8] = b"!<arch>\n";

const COMPRESSED_EXTENSIONS: [&str; 5] = ["gz", "bz2", "xz", "zst", "lz"];

/// Whether `relative` lies under a `share/man` or `share/info` directory
fn in_doc_tree(relative: &Path) -> bool {
    let names: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect();
    names
        .windows(2)
        .any(|w| w[0] == "share" && (w[1] == "man" || w[1] == "info"))
}

fn is_compressed(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| COMPRESSED_EXTENSIONS.contains(&ext))
}

fn with_gz(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

/// Gzip every man and info page under `root`
///
/// Symlinks inside the documentation trees are recreated with a `.gz`
/// suffix pointing at the compressed target. The info `dir` index is left
/// alone. Returns the number of files compressed.
pub fn compress_docs(root: &Path) -> Result<usize> {
    let mut files = Vec::new();
    let mut links = Vec::new();

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !in_doc_tree(relative) || is_compressed(entry.path()) {
            continue;
        }
        if entry.file_name() == "dir" {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            links.push(entry.into_path());
        } else if file_type.is_file() {
            files.push(entry.into_path());
        }
    }

    for path in &files {
        gzip_in_place(path)?;
    }

    for link in &links {
        let target = fs::read_link(link)?;
        if is_compressed(&target) {
            continue;
        }
        fs::remove_file(link)?;
        symlink(&with_gz(&target), &with_gz(link))?;
    }

    Ok(files.len())
}

fn gzip_in_place(path: &Path) -> Result<()> {
    debug!("Compressing {}", path.display());

    let permissions = fs::metadata(path)?.permissions();
    let dest = with_gz(path);
    {
        let mut input = File::open(path)?;
        let mut encoder = GzEncoder::new(File::create(&dest)?, Compression::best());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?;
    }
    fs::set_permissions(&dest, permissions)?;
    fs::remove_file(path)?;
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    warn!(
        "Symlinks are unsupported here; dropping {} -> {}",
        link.display(),
        target.display()
    );
    Ok(())
}

/// Whether the file starts with ELF or `ar` archive magic
pub fn is_strippable(path: &Path) -> Result<bool> {
    let mut magic = Vec::with_capacity(AR_MAGIC.len());
    File::open(path)?
        .take(AR_MAGIC.len() as u64)
        .read_to_end(&mut magic)?;
    Ok(magic.starts_with(ELF_MAGIC) || magic == AR_MAGIC)
}

/// Strip debug symbols from every ELF object and static archive under
/// `root`
///
/// Detection is by magic bytes, never by extension. A missing strip
/// program or a file strip rejects is logged and skipped. Returns the
/// number of files stripped.
pub fn strip_binaries(root: &Path, strip_program: &str) -> Result<usize> {
    if !process::exists(strip_program) {
        warn!("'{}' not found, skipping symbol stripping", strip_program);
        return Ok(0);
    }

    let mut stripped = 0;
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() || !is_strippable(entry.path())? {
            continue;
        }

        match strip_one(entry.path(), strip_program) {
            Ok(()) => stripped += 1,
            Err(e) => warn!("Could not strip {}: {}", entry.path().display(), e),
        }
    }
    Ok(stripped)
}

fn strip_one(path: &Path, strip_program: &str) -> Result<()> {
    let original = fs::metadata(path)?.permissions();
    let readonly = original.readonly();
    if readonly {
        let mut writable = original.clone();
        #[allow(clippy::permissions_set_readonly_false)]
        writable.set_readonly(false);
        fs::set_permissions(path, writable)?;
    }

    let result = Cmd::new(strip_program).arg("-S").arg_path(path).run();

    if readonly {
        fs::set_permissions(path, original)?;
    }
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    #[test]
    fn test_in_doc_tree() {
        assert!(in_doc_tree(Path::new("usr/share/man/man1/ls.1")));
        assert!(in_doc_tree(Path::new("usr/local/share/info/gcc.info")));
        assert!(!in_doc_tree(Path::new("usr/share/doc/ls/README")));
        assert!(!in_doc_tree(Path::new("usr/bin/man")));
    }

    #[test]
    fn test_compress_docs() {
        let dir = tempfile::tempdir().unwrap();
        let man1 = dir.path().join("usr/share/man/man1");
        let info = dir.path().join("usr/share/info");
        fs::create_dir_all(&man1).unwrap();
        fs::create_dir_all(&info).unwrap();
        fs::write(man1.join("hello.1"), ".TH HELLO 1").unwrap();
        fs::write(man1.join("already.1.gz"), "gz").unwrap();
        fs::write(info.join("hello.info"), "info").unwrap();
        fs::write(info.join("dir"), "index").unwrap();
        fs::create_dir_all(dir.path().join("usr/bin")).unwrap();
        fs::write(dir.path().join("usr/bin/hello"), "bin").unwrap();

        let count = compress_docs(dir.path()).unwrap();
        assert_eq!(count, 2);

        assert!(!man1.join("hello.1").exists());
        let mut text = String::new();
        GzDecoder::new(File::open(man1.join("hello.1.gz")).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, ".TH HELLO 1");

        assert!(man1.join("already.1.gz").exists());
        assert!(info.join("hello.info.gz").exists());
        assert!(info.join("dir").exists());
        assert!(dir.path().join("usr/bin/hello").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_compress_docs_retargets_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let man1 = dir.path().join("usr/share/man/man1");
        fs::create_dir_all(&man1).unwrap();
        fs::write(man1.join("hello.1"), ".TH HELLO 1").unwrap();
        std::os::unix::fs::symlink("hello.1", man1.join("hi.1")).unwrap();

        compress_docs(dir.path()).unwrap();

        assert!(fs::symlink_metadata(man1.join("hi.1")).is_err());
        assert_eq!(
            fs::read_link(man1.join("hi.1.gz")).unwrap(),
            PathBuf::from("hello.1.gz")
        );
        assert!(man1.join("hi.1.gz").exists());
    }

    #[test]
    fn test_is_strippable_by_magic() {
        let dir = tempfile::tempdir().unwrap();
        let elf = dir.path().join("prog.txt");
        let ar = dir.path().join("libfoo.a");
        let fake_so = dir.path().join("notes.so");
        let tiny = dir.path().join("tiny");
        fs::write(&elf, b"\x7fELF\x02\x01\x01\x00rest").unwrap();
        fs::write(&ar, b"!<arch>\nmember").unwrap();
        fs::write(&fake_so, b"just some text").unwrap();
        fs::write(&tiny, b"\x7f").unwrap();

        assert!(is_strippable(&elf).unwrap());
        assert!(is_strippable(&ar).unwrap());
        assert!(!is_strippable(&fake_so).unwrap());
        assert!(!is_strippable(&tiny).unwrap());
    }

    #[test]
    fn test_strip_missing_program_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("prog"), b"\x7fELF").unwrap();
        assert_eq!(strip_binaries(dir.path(), "no-such-strip-xyz").unwrap(), 0);
    }

    #[test]
    fn test_strip_leaves_non_binaries_untouched() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("script.so"), "#!/bin/sh").unwrap();
        // `true` accepts any arguments, standing in for a strip program
        assert_eq!(strip_binaries(dir.path(), "true").unwrap(), 0);
        fs::write(dir.path().join("prog"), b"\x7fELF").unwrap();
        assert_eq!(strip_binaries(dir.path(), "true").unwrap(), 1);
    }
}
