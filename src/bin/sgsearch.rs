use anyhow::{Context, Result};
use clap::Parser;
use std::process::exit;

use sgsearch_lib::{
    cli::commands::{handle_command, CliArgs},
    config,
    logging::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose)?;

    let mut config = config::load_config(args.config_path.as_ref())
        .context("Failed to load configuration")?;
    config.apply_env_overrides();

    tracing::debug!("Executing command: {:?}", args.command);
    let result = handle_command(args, &mut config).await;

    if let Err(e) = result {
        tracing::error!("Command execution failed: {:?}", e);
        eprintln!("Error: {:#}", e);
        exit(1);
    } else {
        tracing::debug!("Command executed successfully.");
    }

    Ok(())
}
