use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "nested-manager",
    about = "Maintenance tool for nested filestores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hierarchy digit widths, leaf first
    #[arg(long, global = true, value_delimiter = ',', default_value = "3,3,3")]
    pub widths: Vec<usize>,

    /// Pad character for short path components
    #[arg(long, global = true, default_value_t = '0')]
    pub pad: char,

    /// TOML store configuration; replaces --widths and --pad
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compact every full group into an archive
    UpgradeToArchive(UpgradeArgs),
    /// Check that every archived group serves its whole range
    Validate(ValidateArgs),
    /// Move a tree of {id}.bin files into a store, then compact it
    Ingest(IngestArgs),
}

#[derive(Args)]
pub struct UpgradeArgs {
    /// Store root directory
    pub root: PathBuf,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Store root directory
    pub root: PathBuf,
    /// Stop at the first invalid group
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Args)]
pub struct IngestArgs {
    /// Directory to scan for object files
    pub input: PathBuf,
    /// Store root directory
    pub output: PathBuf,
}
