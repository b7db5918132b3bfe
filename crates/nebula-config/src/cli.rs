//! Command-line argument parsing for the inspection tool.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, Domain};

/// Palette section inspector arguments.
///
/// Format and logging values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(
    name = "nebula-inspect",
    about = "Inspect and re-encode palette containers"
)]
pub struct CliArgs {
    /// Container file to read (`.json` or `.ron`).
    pub input: PathBuf,

    /// Kind of section stored in the container.
    #[arg(long, value_enum, default_value_t = Domain::Blocks)]
    pub domain: Domain,

    /// Format version the input was written at. Defaults to the target version.
    #[arg(long)]
    pub version: Option<u32>,

    /// Format version to re-encode for.
    #[arg(long)]
    pub target_version: Option<u32>,

    /// First format version with aligned index words.
    #[arg(long)]
    pub aligned_since: Option<u32>,

    /// Write the re-encoded container here.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(version) = args.target_version {
            self.format.target_version = version;
        }
        if let Some(since) = args.aligned_since {
            self.format.aligned_since = since;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
