// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn flag(name: &'static str, short: Option<char>, help: &'static str) -> Arg {
    let arg = Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .help(help);
    match short {
        Some(c) => arg.short(c),
        None => arg,
    }
}

fn packages() -> Arg {
    Arg::new("packages")
        .required(true)
        .num_args(1..)
        .help("Package names")
}

fn build_cli() -> Command {
    Command::new("pkgforge")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pkgforge Contributors")
        .about("Source/binary package manager with dependency resolution")
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .default_value("/")
                .help("Live filesystem root to install into (env: PKGFORGE_ROOT)"),
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .global(true)
                .default_value("/usr/local/etc/pkgforge")
                .help("Directory holding the device manifest and file lists (env: PKGFORGE_STATE_DIR)"),
        )
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .global(true)
                .default_value("/usr/local/lib/pkgforge/packages")
                .help("Directory holding package descriptors (env: PKGFORGE_CATALOG)"),
        )
        .arg(
            Arg::new("work-dir")
                .long("work-dir")
                .global(true)
                .default_value("/usr/local/tmp/pkgforge")
                .help("Working directory for downloads and builds (env: PKGFORGE_WORK_DIR)"),
        )
        .arg(flag("verbose", Some('v'), "Enable debug logging").global(true))
        .subcommand(
            Command::new("init")
                .about("Create the device manifest")
                .arg(Arg::new("arch").long("arch").help("Architecture to record")),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages and their missing dependencies")
                .arg(packages())
                .arg(flag("source", Some('s'), "Build from source even when a binary exists"))
                .arg(flag("keep", Some('k'), "Keep the working directory"))
                .arg(flag("yes", Some('y'), "Install dependencies without asking"))
                .arg(flag("no-strip", None, "Do not strip binaries after a source build"))
                .arg(flag("no-compress", None, "Do not compress man and info pages"))
                .arg(flag("check", None, "Run the package's check hook")),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(packages()),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade one package, or every outdated package")
                .arg(Arg::new("package").help("Package name (upgrades all if omitted)"))
                .arg(flag("source", Some('s'), "Build from source even when a binary exists"))
                .arg(flag("yes", Some('y'), "Install new dependencies without asking")),
        )
        .subcommand(
            Command::new("build")
                .about("Build packages from source into distributable archives")
                .arg(packages())
                .arg(flag("keep", Some('k'), "Keep the working directory"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .default_value(".")
                        .help("Directory for the produced archives"),
                ),
        )
        .subcommand(
            Command::new("files")
                .about("List files owned by an installed package")
                .arg(Arg::new("package").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("owner")
                .about("Show which installed packages own a path")
                .arg(Arg::new("path").required(true).help("Path or path fragment")),
        )
        .subcommand(
            Command::new("list")
                .about("List installed packages")
                .arg(flag("available", Some('a'), "List every package in the catalog instead")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true).help("Target shell")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pkgforge.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
