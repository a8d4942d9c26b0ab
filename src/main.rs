//! decant CLI

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "decant")]
#[command(author, version, about = "decant - manifest-driven package installs")]
struct Cli {
    /// Show what would happen without making changes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages from manifest files
    Install {
        /// Manifest file(s) to install
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },
    /// Remove installed packages
    Remove {
        /// Package name(s)
        #[arg(required = true)]
        packages: Vec<String>,
        /// Also trash the auxiliary user-data paths the manifest declared
        #[arg(long)]
        zap: bool,
    },
    /// List installed packages
    List,
    /// Show install state for a package
    Info {
        /// Package name
        package: String,
        /// Emit the record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a manifest without installing it
    Check {
        /// Manifest file to check
        manifest: PathBuf,
    },
    /// Compute SHA-256 digests of files (for manifest authoring)
    #[command(hide = true)]
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let dry_run = cli.dry_run;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Install { manifests } => cmd::install::install(&manifests, dry_run, quiet).await,
        Commands::Remove { packages, zap } => {
            cmd::remove::remove(&packages, zap, dry_run, quiet).await
        }
        Commands::List => cmd::list::list().await,
        Commands::Info { package, json } => cmd::info::info(&package, json).await,
        Commands::Check { manifest } => cmd::check::check(&manifest),
        Commands::Hash { files } => cmd::hash::hash(&files),
    }
}
