use anyhow::{bail, Context, Result};
use clap::Args;
use colored::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sgsearch_client::client::deep_search::{PollOptions, PollOutcome};
use sgsearch_client::DeepSearchClient;

use crate::cli::formatters::print_conversation;
use crate::config::AppConfig;

#[derive(Args, Debug, Clone)]
pub struct AskArgs {
    /// The question to ask
    #[arg(required = true)]
    pub question: String,

    /// Give up after this many status checks
    #[arg(long)]
    pub max_polls: Option<u32>,

    /// Delay between status checks, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Ask Sourcegraph.com even when a custom instance is configured
    #[arg(long)]
    pub dotcom: bool,
}

/// Handles the `ask` command. Ctrl-C stops waiting for the answer.
pub async fn handle_ask(args: &AskArgs, config: &AppConfig) -> Result<()> {
    let question = args.question.trim();
    if question.is_empty() {
        bail!("Question must not be empty");
    }

    let instance = config.instance(args.dotcom);
    info!("Asking {}", instance.url);
    let client = DeepSearchClient::new(instance).context("Failed to create Deep Search client")?;
    let conversation = client
        .start(question)
        .await
        .context("Failed to start Deep Search")?;
    println!("{} {}", "Conversation:".dimmed(), conversation.id);

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, cancelling Deep Search polling");
                cancel.cancel();
            }
        })
    };

    let options = PollOptions {
        interval: Duration::from_millis(args.interval_ms),
        max_attempts: args.max_polls,
    };
    let outcome = client
        .poll_until_complete(conversation.id, options, &cancel)
        .await;
    ctrl_c.abort();

    match outcome.context("Deep Search did not complete")? {
        PollOutcome::Cancelled => {
            println!("{}", "Stopped waiting for the answer.".yellow());
            Ok(())
        }
        PollOutcome::Completed(conversation) => {
            print_conversation(&conversation);
            match conversation.latest_question().and_then(|q| q.error.as_ref()) {
                Some(error) => bail!("{}: {}", error.title, error.message),
                None => Ok(()),
            }
        }
    }
}
