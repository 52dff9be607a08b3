// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pkgforge::install::{AssumeYes, InstallOutcome};
use pkgforge::package::{Architecture, Catalog};
use pkgforge::{manifest, Config, PackageManager};
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pkgforge")]
#[command(author, version, about = "Source/binary package manager with dependency resolution", long_about = None)]
struct Cli {
    /// Live filesystem root to install into
    #[arg(long, global = true, env = "PKGFORGE_ROOT", default_value = pkgforge::config::DEFAULT_ROOT)]
    root: PathBuf,

    /// Directory holding the device manifest and file lists
    #[arg(long, global = true, env = "PKGFORGE_STATE_DIR", default_value = pkgforge::config::DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    /// Directory holding package descriptors
    #[arg(long, global = true, env = "PKGFORGE_CATALOG", default_value = pkgforge::config::DEFAULT_CATALOG_DIR)]
    catalog: PathBuf,

    /// Working directory for downloads and builds
    #[arg(long, global = true, env = "PKGFORGE_WORK_DIR", default_value = pkgforge::config::DEFAULT_WORK_DIR)]
    work_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the device manifest
    Init {
        /// Architecture to record (defaults to the host; required on unsupported hosts)
        #[arg(long)]
        arch: Option<Architecture>,
    },
    /// Install packages and their missing dependencies
    Install {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Build from source even when a binary exists
        #[arg(short = 's', long)]
        source: bool,
        /// Keep the working directory
        #[arg(short = 'k', long)]
        keep: bool,
        /// Install dependencies without asking
        #[arg(short = 'y', long)]
        yes: bool,
        /// Do not strip binaries after a source build
        #[arg(long)]
        no_strip: bool,
        /// Do not compress man and info pages
        #[arg(long)]
        no_compress: bool,
        /// Run the package's check hook
        #[arg(long)]
        check: bool,
    },
    /// Remove installed packages
    Remove {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Upgrade one package, or every outdated package
    Upgrade {
        /// Package name (upgrades all if omitted)
        package: Option<String>,
        /// Build from source even when a binary exists
        #[arg(short = 's', long)]
        source: bool,
        /// Install new dependencies without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Build packages from source into distributable archives
    Build {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Keep the working directory
        #[arg(short = 'k', long)]
        keep: bool,
        /// Directory for the produced archives
        #[arg(short = 'o', long, default_value = ".")]
        output: PathBuf,
    },
    /// List files owned by an installed package
    Files {
        /// Package name
        package: String,
    },
    /// Show which installed packages own a path
    Owner {
        /// Path or path fragment
        path: String,
    },
    /// List installed packages
    List {
        /// List every package in the catalog instead
        #[arg(short, long)]
        available: bool,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config {
        root: cli.root,
        state_dir: cli.state_dir,
        catalog_dir: cli.catalog,
        work_dir: cli.work_dir,
        ..Config::default()
    };

    match cli.command {
        Commands::Init { arch } => {
            let Some(arch) = arch.or(config.architecture) else {
                anyhow::bail!(
                    "Unsupported host architecture '{}'; pass --arch",
                    std::env::consts::ARCH
                );
            };
            let path = config.manifest_path();
            let device = manifest::init(&path, arch)?;
            println!(
                "Device manifest ready at {} ({}, {} packages installed)",
                path.display(),
                device.architecture,
                device.installed().len()
            );
            Ok(())
        }
        Commands::Install {
            packages,
            source,
            keep,
            yes,
            no_strip,
            no_compress,
            check,
        } => {
            config.build.keep_work_dir = keep;
            config.build.strip = !no_strip;
            config.build.compress_docs = !no_compress;
            config.build.run_checks = check;

            let catalog = load_catalog(&config)?;
            let mut pm = open(config, &catalog, yes)?;

            run_batch("install", &packages, |name| {
                match pm.install(name, source)? {
                    InstallOutcome::AlreadyInstalled => {
                        println!("{} is already installed", name)
                    }
                    InstallOutcome::Installed { version } => {
                        println!("Installed {} {}", name, version)
                    }
                    other => info!("{}: {:?}", name, other),
                }
                Ok(())
            })
        }
        Commands::Remove { packages } => {
            let catalog = Catalog::new();
            let mut pm = PackageManager::open(config, &catalog)?;

            let mut unclean = 0;
            for name in &packages {
                match pm.remove(name)? {
                    Some(report) => {
                        println!(
                            "Removed {} {} ({} paths deleted, {} directories kept)",
                            report.package,
                            report.version,
                            report.removed.len(),
                            report.retained.len()
                        );
                        for (path, reason) in &report.failed {
                            eprintln!("  could not remove {}: {}", path.display(), reason);
                        }
                        if !report.is_clean() {
                            unclean += 1;
                        }
                    }
                    None => println!("{} is not installed", name),
                }
            }

            if unclean > 0 {
                anyhow::bail!("{} package(s) left files behind", unclean);
            }
            Ok(())
        }
        Commands::Upgrade {
            package,
            source,
            yes,
        } => {
            let catalog = load_catalog(&config)?;
            let mut pm = open(config, &catalog, yes)?;

            match package {
                Some(name) => {
                    match pm.upgrade(&name, source)? {
                        InstallOutcome::UpToDate => println!("{} is up to date", name),
                        InstallOutcome::Upgraded { from, to } => {
                            println!("Upgraded {} from {} to {}", name, from, to)
                        }
                        other => info!("{}: {:?}", name, other),
                    }
                    Ok(())
                }
                None => {
                    let summary = pm.upgrade_all(source)?;
                    for (name, from, to) in &summary.upgraded {
                        println!("Upgraded {} from {} to {}", name, from, to);
                    }
                    if summary.upgraded.is_empty() && summary.is_success() {
                        println!("All packages are up to date");
                    }
                    for (name, err) in &summary.failed {
                        eprintln!("Failed to upgrade {}: {}", name, err);
                    }
                    if !summary.is_success() {
                        anyhow::bail!("{} upgrade(s) failed", summary.failed.len());
                    }
                    Ok(())
                }
            }
        }
        Commands::Build {
            packages,
            keep,
            output,
        } => {
            config.build.keep_work_dir = keep;
            config.output_dir = output;
            std::fs::create_dir_all(&config.output_dir).with_context(|| {
                format!("Failed to create output directory {}", config.output_dir.display())
            })?;

            let catalog = load_catalog(&config)?;
            let mut pm = open(config, &catalog, false)?;

            run_batch("build", &packages, |name| {
                let built = pm.build(name)?;
                println!("Built {}", built.archive.display());
                println!("  sha256: {}", built.sha256);
                Ok(())
            })
        }
        Commands::Files { package } => {
            let catalog = Catalog::new();
            let pm = PackageManager::open(config, &catalog)?;

            let Some(lists) = pm.files(&package)? else {
                anyhow::bail!("Package '{}' is not installed", package);
            };
            for dir in &lists.directories {
                println!("{}/", dir);
            }
            for file in &lists.files {
                println!("{}", file);
            }
            Ok(())
        }
        Commands::Owner { path } => {
            let catalog = Catalog::new();
            let pm = PackageManager::open(config, &catalog)?;

            let owners = pm.owners(&path)?;
            if owners.is_empty() {
                println!("No installed package owns {}", path);
            }
            for (package, file) in owners {
                println!("{}: {}", package, file);
            }
            Ok(())
        }
        Commands::List { available: true } => {
            let catalog = load_catalog(&config)?;
            if catalog.is_empty() {
                println!("No packages in {}", config.catalog_dir.display());
                return Ok(());
            }
            let pm = PackageManager::open(config, &catalog)?;

            for (pkg, installed) in pm.available() {
                match installed {
                    Some(v) if v == pkg.version() => println!("{} {} [installed]", pkg.name(), pkg.version()),
                    Some(v) => println!("{} {} [installed: {}]", pkg.name(), pkg.version(), v),
                    None => println!("{} {}", pkg.name(), pkg.version()),
                }
                if let Some(description) = pkg.description() {
                    println!("    {}", description);
                }
                if let Some(homepage) = pkg.homepage() {
                    println!("    {}", homepage);
                }
            }
            Ok(())
        }
        Commands::List { available: false } => {
            let catalog = Catalog::new();
            let pm = PackageManager::open(config, &catalog)?;

            println!("Architecture: {}", pm.architecture());
            for entry in pm.installed() {
                println!("{} {}", entry.name, entry.version);
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pkgforge", &mut io::stdout());
            Ok(())
        }
    }
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    Catalog::load_dir(&config.catalog_dir).with_context(|| {
        format!("Failed to load package catalog from {}", config.catalog_dir.display())
    })
}

fn open<'c>(config: Config, catalog: &'c Catalog, yes: bool) -> Result<PackageManager<'c>> {
    let pm = PackageManager::open(config, catalog)?;
    Ok(if yes { pm.with_confirm(AssumeYes) } else { pm })
}

/// Run `op` for every name, continuing past failures unless one aborts the
/// whole run
fn run_batch(
    verb: &str,
    names: &[String],
    mut op: impl FnMut(&str) -> pkgforge::Result<()>,
) -> Result<()> {
    let mut failed = 0;
    for name in names {
        match op(name) {
            Ok(()) => {}
            Err(e) if e.aborts_run() => return Err(e.into()),
            Err(e) => {
                warn!("Failed to {} {}: {}", verb, name, e);
                eprintln!("Error: {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} package(s) failed to {}", failed, names.len(), verb);
    }
    Ok(())
}
