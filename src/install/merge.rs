// src/install/merge.rs

//! Merging a staged payload into the live filesystem root

use crate::build::Staged;
use crate::error::{Error, Result};
use crate::manifest::filelist::resolve;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use tracing::debug;

/// Copy every staged directory and file into `root`
///
/// Existing directories (and symlinks to directories) are reused as they
/// are. Existing files are unlinked before the new one is put in place, so
/// read-only files are replaced without changing their parent's ownership.
pub fn merge_tree(staged: &Staged, root: &Path) -> Result<()> {
    debug!(
        "Merging {} into {}",
        staged.root.display(),
        root.display()
    );

    for dir in &staged.lists.directories {
        let dest = resolve(root, dir);
        if dest.is_dir() {
            continue;
        }
        if fs::symlink_metadata(&dest).is_ok() {
            fs::remove_file(&dest)?;
        }
        fs::create_dir_all(&dest)?;
        let permissions = fs::metadata(resolve(&staged.root, dir))?.permissions();
        fs::set_permissions(&dest, permissions)?;
    }

    for file in &staged.lists.files {
        let src = resolve(&staged.root, file);
        let dest = resolve(root, file);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::symlink_metadata(&dest) {
            Ok(meta) if meta.is_dir() => {
                return Err(Error::Io(io::Error::new(
                    ErrorKind::AlreadyExists,
                    format!("{} is a directory and cannot be replaced by a file", dest.display()),
                )));
            }
            Ok(_) => fs::remove_file(&dest)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        place(&src, &dest)?;
    }

    Ok(())
}

/// Move `src` to `dest`, falling back to a copy across filesystems
fn place(src: &Path, dest: &Path) -> Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dest)
    } else {
        fs::copy(src, dest)?;
        Ok(())
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dest)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileLists;

    fn staged(base: &Path) -> Staged {
        let root = base.join("dest");
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::create_dir_all(root.join("usr/share/hello")).unwrap();
        fs::write(root.join("usr/bin/hello"), "new").unwrap();
        fs::write(root.join("usr/share/hello/data"), "data").unwrap();
        Staged {
            lists: FileLists::from_tree(&root).unwrap(),
            root,
        }
    }

    #[test]
    fn test_merge_into_empty_root() {
        let base = tempfile::tempdir().unwrap();
        let live = base.path().join("live");
        merge_tree(&staged(base.path()), &live).unwrap();

        assert_eq!(fs::read_to_string(live.join("usr/bin/hello")).unwrap(), "new");
        assert!(live.join("usr/share/hello/data").exists());
    }

    #[test]
    fn test_merge_replaces_readonly_file_and_keeps_neighbours() {
        let base = tempfile::tempdir().unwrap();
        let live = base.path().join("live");
        fs::create_dir_all(live.join("usr/bin")).unwrap();
        fs::write(live.join("usr/bin/hello"), "old").unwrap();
        fs::write(live.join("usr/bin/other"), "other").unwrap();
        let mut perms = fs::metadata(live.join("usr/bin/hello")).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(live.join("usr/bin/hello"), perms).unwrap();

        merge_tree(&staged(base.path()), &live).unwrap();

        assert_eq!(fs::read_to_string(live.join("usr/bin/hello")).unwrap(), "new");
        assert_eq!(fs::read_to_string(live.join("usr/bin/other")).unwrap(), "other");
    }

    #[cfg(unix)]
    #[test]
    fn test_merge_reuses_directory_symlink() {
        let base = tempfile::tempdir().unwrap();
        let live = base.path().join("live");
        fs::create_dir_all(live.join("real-share")).unwrap();
        fs::create_dir_all(live.join("usr")).unwrap();
        std::os::unix::fs::symlink(live.join("real-share"), live.join("usr/share")).unwrap();

        merge_tree(&staged(base.path()), &live).unwrap();

        assert!(fs::symlink_metadata(live.join("usr/share")).unwrap().file_type().is_symlink());
        assert!(live.join("real-share/hello/data").exists());
    }

    #[test]
    fn test_directory_in_the_way_is_an_error() {
        let base = tempfile::tempdir().unwrap();
        let live = base.path().join("live");
        fs::create_dir_all(live.join("usr/bin/hello")).unwrap();

        assert!(merge_tree(&staged(base.path()), &live).is_err());
    }
}
