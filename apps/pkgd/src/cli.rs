//! Command line interface definition

use clap::{Parser, Subcommand, ValueEnum};
use pkgd_repository::ArchiveFormat;
use pkgd_types::{Arch, PackageReference};
use std::path::PathBuf;

/// pkgd - local package transaction service
#[derive(Parser)]
#[command(name = "pkgd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local package transaction service")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Package catalogue (TOML) the repository is seeded from
    #[arg(long, global = true, value_name = "PATH", env = "PKGD_CATALOGUE")]
    pub catalogue: Option<PathBuf>,

    /// Install these references before running the command
    #[arg(long, global = true, value_name = "REF")]
    pub preinstall: Vec<PackageReference>,

    /// Answer every confirmation with this choice when it is offered
    #[arg(long, global = true, value_name = "CHOICE")]
    pub answer: Option<String>,

    /// Concurrent transactions (overrides config and environment)
    #[arg(long, global = true, value_name = "N")]
    pub jobs: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    Always,
    Auto,
    Never,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Install packages and their missing dependencies
    #[command(alias = "i")]
    Install {
        /// References as channel:name/version/arch
        #[arg(required = true)]
        packages: Vec<PackageReference>,

        /// Module to install
        #[arg(long, default_value = "binary")]
        module: String,
    },

    /// Install a package from an archive file
    InstallArchive {
        /// Archive file
        path: PathBuf,

        /// Archive container format
        #[arg(long, default_value = "layer")]
        format: ArchiveFormat,
    },

    /// Replace an installed version with a newer one
    #[command(alias = "up")]
    Update {
        /// Installed reference
        from: PackageReference,

        /// Newer reference
        to: PackageReference,

        #[arg(long, default_value = "binary")]
        module: String,
    },

    /// Uninstall packages
    #[command(alias = "rm")]
    Uninstall {
        #[arg(required = true)]
        packages: Vec<PackageReference>,

        #[arg(long, default_value = "binary")]
        module: String,
    },

    /// Remove runtimes and bases nothing depends on
    Prune,

    /// Migrate the repository to the current storage format
    Migrate,

    /// Search the catalogue
    Search {
        /// Text matched against names and descriptions
        query: String,

        #[arg(long)]
        channel: Option<String>,

        #[arg(long)]
        arch: Option<Arch>,
    },

    /// List installed packages
    #[command(alias = "ls")]
    List,

    /// List tasks created during this run
    Tasks,

    /// Repository configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the active repository configuration
    Show,

    /// Add or replace a remote repository
    AddRepo {
        name: String,
        url: String,

        #[arg(long, default_value_t = 0)]
        priority: u32,
    },

    /// Choose the default repository
    SetDefault { name: String },
}
