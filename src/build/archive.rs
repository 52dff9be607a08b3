// src/build/archive.rs

//! Build-only output: a distributable `.tar.xz` of a staged payload plus a
//! companion `.sha256` file

use super::Staged;
use crate::error::Result;
use crate::fetch::sha256_file;
use crate::manifest::filelist;
use crate::package::{Architecture, Package};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tracing::info;
use xz2::write::XzEncoder;

/// XZ preset used for package archives
const XZ_LEVEL: u32 = 6;

/// Result of packaging a staged build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPackage {
    pub archive: PathBuf,
    pub checksum_file: PathBuf,
    pub sha256: String,
}

/// `<name>-<version>-<platform>-<arch>.tar.xz`
pub fn archive_name(pkg: &Package, platform_tag: &str, arch: Architecture) -> String {
    format!(
        "{}-{}-{}-{}.tar.xz",
        pkg.name(),
        pkg.version(),
        platform_tag,
        arch
    )
}

/// Package `staged` into `output_dir`
///
/// The archive root holds the staged tree plus `filelist` and `dlist`, so
/// it can later be installed as a binary artifact.
pub fn package_staged(
    staged: &Staged,
    pkg: &Package,
    platform_tag: &str,
    arch: Architecture,
    output_dir: &Path,
) -> Result<BuiltPackage> {
    fs::create_dir_all(output_dir)?;
    let name = archive_name(pkg, platform_tag, arch);
    let archive = output_dir.join(&name);

    {
        let encoder = XzEncoder::new(File::create(&archive)?, XZ_LEVEL);
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);

        append_list(&mut builder, "filelist", &staged.lists.files)?;
        append_list(&mut builder, "dlist", &staged.lists.directories)?;

        for listed in staged.lists.directories.iter().chain(&staged.lists.files) {
            let source = filelist::resolve(&staged.root, listed);
            builder.append_path_with_name(&source, listed.trim_start_matches('/'))?;
        }

        builder.into_inner()?.finish()?;
    }

    let sha256 = sha256_file(&archive)?;
    let checksum_file = output_dir.join(format!("{}.sha256", name));
    fs::write(&checksum_file, format!("{}  {}\n", sha256, name))?;

    info!("Packaged {} ({})", archive.display(), sha256);
    Ok(BuiltPackage {
        archive,
        checksum_file,
        sha256,
    })
}

fn append_list<W: std::io::Write>(builder: &mut Builder<W>, name: &str, lines: &[String]) -> Result<()> {
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }

    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileLists;
    use std::io::Read;
    use xz2::read::XzDecoder;

    #[test]
    fn test_archive_name() {
        let pkg = Package::new("hello", "2.12");
        assert_eq!(
            archive_name(&pkg, "linux", Architecture::Aarch64),
            "hello-2.12-linux-aarch64.tar.xz"
        );
    }

    #[test]
    fn test_package_staged() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("dest");
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::write(root.join("usr/bin/hello"), "hello").unwrap();
        let staged = Staged {
            lists: FileLists::from_tree(&root).unwrap(),
            root,
        };
        let pkg = Package::new("hello", "2.12");
        let out = base.path().join("out");

        let built = package_staged(&staged, &pkg, "linux", Architecture::X86_64, &out).unwrap();

        assert_eq!(built.archive, out.join("hello-2.12-linux-x86_64.tar.xz"));
        assert_eq!(
            fs::read_to_string(&built.checksum_file).unwrap(),
            format!("{}  hello-2.12-linux-x86_64.tar.xz\n", built.sha256)
        );
        assert_eq!(sha256_file(&built.archive).unwrap(), built.sha256);

        let mut archive = tar::Archive::new(XzDecoder::new(File::open(&built.archive).unwrap()));
        let mut names = Vec::new();
        let mut filelist = String::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
            if path == "filelist" {
                entry.read_to_string(&mut filelist).unwrap();
            }
            names.push(path);
        }
        assert_eq!(names, vec!["filelist", "dlist", "usr", "usr/bin", "usr/bin/hello"]);
        assert_eq!(filelist, "/usr/bin/hello\n");
    }
}
