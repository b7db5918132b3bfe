//! Palette container inspector.
//!
//! Reads a block or biome section stored as `{palette, data}` in JSON or RON,
//! prints its palette layout, and optionally re-encodes it for another format
//! version.
//!
//! Run with: `cargo run -p nebula-inspect -- section.json --domain blocks`

mod inspect;

use std::process::ExitCode;

use clap::Parser;
use nebula_config::{CliArgs, Config, default_config_dir};
use tracing::{error, info, warn};

use crate::inspect::{InspectError, Report, decode, read_container, reencode, write_container};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Load config before logging so its level applies; report failures after.
    let config_dir = args.config.clone().or_else(default_config_dir);
    let (mut config, config_error) = match config_dir.as_deref().map(Config::load_or_create) {
        Some(Ok(config)) => (config, None),
        Some(Err(err)) => (Config::default(), Some(err)),
        None => (Config::default(), None),
    };
    config.apply_cli_overrides(&args);

    nebula_log::init_logging(None, cfg!(debug_assertions), Some(&config));

    if let Some(err) = config_error {
        warn!("using default config: {err}");
    }

    match run(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs, config: &Config) -> Result<(), InspectError> {
    let version = args.version.unwrap_or(config.format.target_version);
    info!("Inspecting {} as {}", args.input.display(), args.domain);

    let container = read_container(&args.input)?;
    let mut cuboid = decode(container, args.domain, version, config)?;
    print!("{}", Report::new(&cuboid, args.domain, version));

    if let Some(output) = &args.output {
        let container = reencode(&mut cuboid, args.domain, config)?;
        write_container(output, &container)?;
        info!(
            "Wrote {} for version {} ({:?}, {} bits)",
            output.display(),
            config.format.target_version,
            cuboid.layout(),
            cuboid.bits()
        );
    }
    Ok(())
}
