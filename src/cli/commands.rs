use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{AppConfig, CONFIG_PATH_ENV};

/// Streaming code search against Sourcegraph.
#[derive(Parser, Debug)]
#[command(name = "sgsearch", author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file (overrides the default location)
    #[arg(long = "config", global = true, env = CONFIG_PATH_ENV)]
    pub config_path: Option<PathBuf>,

    /// Increase log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a streaming search and print results as they arrive
    Search(super::search::SearchArgs),
    /// Read queries from stdin; each line replaces the search in flight
    Interactive(super::interactive::InteractiveArgs),
    /// Ask a Deep Search question and wait for the answer
    Ask(super::ask::AskArgs),
    /// Show or change the configuration
    Config(super::config_commands::ConfigArgs),
}

/// Dispatches the parsed command to its handler.
pub async fn handle_command(args: CliArgs, config: &mut AppConfig) -> Result<()> {
    match args.command {
        Commands::Search(ref cmd_args) => super::search::handle_search(cmd_args, config).await,
        Commands::Interactive(ref cmd_args) => {
            super::interactive::handle_interactive(cmd_args, config).await
        }
        Commands::Ask(ref cmd_args) => super::ask::handle_ask(cmd_args, config).await,
        Commands::Config(ref cmd_args) => {
            super::config_commands::handle_config_command(cmd_args, config, args.config_path.as_ref())
        }
    }
}
