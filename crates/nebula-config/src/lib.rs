//! Configuration for the palette tooling.
//!
//! Settings persist to disk as RON files and cover the format version policy,
//! per-domain section parameters, and logging. CLI values parsed with clap
//! override what was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, Domain, DomainConfig, FormatConfig, default_config_dir};
pub use error::ConfigError;
