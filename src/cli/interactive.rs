use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use sgsearch_client::{SearchCoordinator, SessionState};

use crate::cli::formatters::{print_result, print_summary};
use crate::cli::search::{build_connector, resolve_instance};
use crate::config::AppConfig;

#[derive(Args, Debug, Clone)]
pub struct InteractiveArgs {
    /// Query syntax: keyword, literal, regexp, structural, standard or nls
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Keep at most this many results per search
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Search Sourcegraph.com even when a custom instance is configured
    #[arg(long)]
    pub dotcom: bool,
}

enum Input {
    Search(String),
    Cancel,
    Quit,
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        ":quit" | ":q" => Input::Quit,
        ":cancel" => Input::Cancel,
        text => Input::Search(text.to_string()),
    }
}

/// Handles the `interactive` command. Every line read from stdin supersedes
/// the search in flight; `:cancel` aborts it and `:quit` exits.
pub async fn handle_interactive(args: &InteractiveArgs, config: &AppConfig) -> Result<()> {
    let instance = resolve_instance(config, args.dotcom, args.pattern.as_deref(), args.limit)?;
    let connector = build_connector(&instance, None).await?;
    let mut coordinator = SearchCoordinator::new(instance, connector);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut printed = 0;
    let mut reported = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read from stdin")? {
                    Some(line) => match parse_input(&line) {
                        Input::Quit => break,
                        Input::Cancel => {
                            coordinator.cancel();
                            println!("{}", "Search cancelled.".yellow());
                        }
                        Input::Search(text) if text.is_empty() => {}
                        Input::Search(text) => {
                            let generation = coordinator.generation();
                            coordinator.search(&text);
                            if coordinator.generation() != generation {
                                printed = 0;
                                reported = false;
                                println!("{} {}", ">".bold(), coordinator.snapshot().query);
                            }
                        }
                    },
                    None => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                }
            }
            _ = coordinator.next_update(), if coordinator.is_active() => {}
            else => break,
        }

        let snapshot = coordinator.snapshot();
        for (index, result) in snapshot.results.iter().enumerate().skip(printed) {
            print_result(index, result);
        }
        printed = snapshot.results.len();

        if !reported && !snapshot.is_loading && snapshot.state != SessionState::Aborted {
            print_summary(snapshot);
            if let Some(error) = &snapshot.last_error {
                eprintln!("{} {}", "Search failed:".red(), error);
            }
            reported = true;
        }
    }

    Ok(())
}
