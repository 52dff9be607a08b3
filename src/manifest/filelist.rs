// src/manifest/filelist.rs

//! Per-package file and directory lists
//!
//! Each installed package owns two plain-text lists (one path per line)
//! stored next to the manifest. Directories are recorded parents first, so
//! walking the list backwards visits children before their parents.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const FILES_EXT: &str = "filelist";
const DIRS_EXT: &str = "directorylist";

/// Paths a package installed, relative to the install root but written
/// with a leading `/`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileLists {
    pub files: Vec<String>,
    pub directories: Vec<String>,
}

impl FileLists {
    /// Record a staged tree. The root itself is not listed; symlinks are
    /// listed as files and never followed.
    pub fn from_tree(root: &Path) -> Result<Self> {
        let mut lists = Self::default();

        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let relative = entry.path().strip_prefix(root).map_err(|_| {
                Error::ParseError(format!("{} escapes {}", entry.path().display(), root.display()))
            })?;
            let path = to_listed(relative);

            if entry.file_type().is_dir() {
                lists.directories.push(path);
            } else {
                lists.files.push(path);
            }
        }

        Ok(lists)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

fn to_listed(relative: &Path) -> String {
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

/// Resolve a listed path against an install root
pub fn resolve(root: &Path, listed: &str) -> PathBuf {
    root.join(listed.trim_start_matches('/'))
}

/// Directory of list files, keyed by package name
#[derive(Debug, Clone)]
pub struct FileListStore {
    dir: PathBuf,
}

impl FileListStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn files_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, FILES_EXT))
    }

    fn dirs_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, DIRS_EXT))
    }

    pub fn write(&self, name: &str, lists: &FileLists) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.files_path(name), join_lines(&lists.files))?;
        fs::write(self.dirs_path(name), join_lines(&lists.directories))?;
        Ok(())
    }

    /// Lists for `name`, or `None` when neither list was recorded
    pub fn read(&self, name: &str) -> Result<Option<FileLists>> {
        let files = read_list(&self.files_path(name))?;
        let directories = read_list(&self.dirs_path(name))?;
        if files.is_none() && directories.is_none() {
            return Ok(None);
        }
        Ok(Some(FileLists {
            files: files.unwrap_or_default(),
            directories: directories.unwrap_or_default(),
        }))
    }

    /// Delete both list artifacts. Missing lists are not an error.
    pub fn remove(&self, name: &str) -> Result<()> {
        for path in [self.files_path(name), self.dirs_path(name)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Installed files whose path contains `fragment`, as `(package, path)`
    pub fn owners(&self, fragment: &str) -> Result<Vec<(String, String)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut matches = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != FILES_EXT) {
                continue;
            }
            let Some(package) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            for line in split_lines(&fs::read_to_string(&path)?) {
                if line.contains(fragment) {
                    matches.push((package.clone(), line));
                }
            }
        }

        matches.sort();
        Ok(matches)
    }
}

fn join_lines(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn split_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn read_list(path: &Path) -> Result<Option<Vec<String>>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(split_lines(&content))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("usr/bin")).unwrap();
        fs::create_dir_all(dir.path().join("usr/share/doc/hello")).unwrap();
        fs::write(dir.path().join("usr/bin/hello"), "bin").unwrap();
        fs::write(dir.path().join("usr/share/doc/hello/README"), "doc").unwrap();
        dir
    }

    #[test]
    fn test_from_tree() {
        let dir = staged_tree();
        let lists = FileLists::from_tree(dir.path()).unwrap();

        assert_eq!(
            lists.files,
            vec!["/usr/bin/hello", "/usr/share/doc/hello/README"]
        );
        assert_eq!(
            lists.directories,
            vec![
                "/usr",
                "/usr/bin",
                "/usr/share",
                "/usr/share/doc",
                "/usr/share/doc/hello"
            ]
        );
    }

    #[test]
    fn test_directories_parent_before_child() {
        let dir = staged_tree();
        let lists = FileLists::from_tree(dir.path()).unwrap();
        for (i, d) in lists.directories.iter().enumerate() {
            for later in &lists.directories[i + 1..] {
                assert!(!d.starts_with(&format!("{}/", later)), "{} listed before its parent {}", d, later);
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_listed_as_files() {
        let dir = staged_tree();
        std::os::unix::fs::symlink("hello", dir.path().join("usr/bin/hi")).unwrap();
        std::os::unix::fs::symlink("share", dir.path().join("usr/lib")).unwrap();

        let lists = FileLists::from_tree(dir.path()).unwrap();
        assert!(lists.files.contains(&"/usr/bin/hi".to_string()));
        assert!(lists.files.contains(&"/usr/lib".to_string()));
        assert!(!lists.directories.contains(&"/usr/lib".to_string()));
    }

    #[test]
    fn test_store_round_trip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::new(dir.path().join("meta"));
        let lists = FileLists {
            files: vec!["/usr/bin/hello".into()],
            directories: vec!["/usr".into(), "/usr/bin".into()],
        };

        assert!(store.read("hello").unwrap().is_none());
        store.write("hello", &lists).unwrap();
        assert_eq!(store.read("hello").unwrap(), Some(lists));

        store.remove("hello").unwrap();
        assert!(store.read("hello").unwrap().is_none());
        store.remove("hello").unwrap();
    }

    #[test]
    fn test_read_directory_list_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::new(dir.path());
        store
            .write(
                "hello",
                &FileLists {
                    files: vec!["/usr/bin/hello".into()],
                    directories: vec!["/usr".into(), "/usr/bin".into()],
                },
            )
            .unwrap();
        fs::remove_file(dir.path().join("hello.filelist")).unwrap();

        let lists = store.read("hello").unwrap().unwrap();
        assert!(lists.files.is_empty());
        assert_eq!(lists.directories, vec!["/usr", "/usr/bin"]);
    }

    #[test]
    fn test_owners() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::new(dir.path());
        store
            .write(
                "hello",
                &FileLists {
                    files: vec!["/usr/bin/hello".into(), "/usr/share/man/man1/hello.1.gz".into()],
                    directories: vec![],
                },
            )
            .unwrap();
        store
            .write(
                "zlib",
                &FileLists {
                    files: vec!["/usr/lib/libz.so".into()],
                    directories: vec![],
                },
            )
            .unwrap();

        let owners = store.owners("bin/hello").unwrap();
        assert_eq!(owners, vec![("hello".to_string(), "/usr/bin/hello".to_string())]);
        assert_eq!(store.owners("/usr/").unwrap().len(), 3);
        assert!(FileListStore::new(dir.path().join("missing")).owners("x").unwrap().is_empty());
    }

    #[test]
    fn test_resolve() {
        assert_eq!(
            resolve(Path::new("/mnt/root"), "/usr/bin/hello"),
            PathBuf::from("/mnt/root/usr/bin/hello")
        );
    }
}
