use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use sgsearch_client::links::{instance_name, query_url, LinkBuilder};
use sgsearch_client::{Connector, HttpConnector, Instance, PatternType, ScriptedConnector, SearchCoordinator};

use crate::cli::formatters::{print_result, print_summary, snapshot_json};
use crate::config::AppConfig;

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// The search query
    #[arg(required = true)]
    pub query: String,

    /// Query syntax: keyword, literal, regexp, structural, standard or nls
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Keep at most this many results
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Output results as JSON once the search finishes
    #[arg(long)]
    pub json: bool,

    /// Search Sourcegraph.com even when a custom instance is configured
    #[arg(long)]
    pub dotcom: bool,

    /// Replay a saved text/event-stream transcript instead of connecting
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,
}

/// Resolve the instance for a search command from config and flags.
pub fn resolve_instance(
    config: &AppConfig,
    dotcom: bool,
    pattern: Option<&str>,
    limit: Option<usize>,
) -> Result<Instance> {
    let mut instance = config.instance(dotcom);
    if let Some(pattern) = pattern {
        let pattern_type: PatternType = pattern.parse()?;
        instance = instance.with_pattern_type(pattern_type);
    }
    if let Some(limit) = limit {
        instance = instance.with_max_results(limit);
    }
    Ok(instance)
}

/// Build the connector for `instance`, or a replaying one for `replay`.
pub async fn build_connector(
    instance: &Instance,
    replay: Option<&PathBuf>,
) -> Result<Arc<dyn Connector>> {
    match replay {
        Some(path) => {
            let transcript = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read transcript '{}'", path.display()))?;
            Ok(Arc::new(ScriptedConnector::from_transcript(&transcript).await))
        }
        None => Ok(Arc::new(
            HttpConnector::new(instance.clone()).context("Failed to create search client")?,
        )),
    }
}

/// Handles the `search` command.
pub async fn handle_search(args: &SearchArgs, config: &AppConfig) -> Result<()> {
    let instance = resolve_instance(config, args.dotcom, args.pattern.as_deref(), args.limit)?;
    info!("Searching {} for '{}'", instance.url, args.query);
    let connector = build_connector(&instance, args.replay.as_ref()).await?;

    let mut coordinator = SearchCoordinator::new(instance, connector);
    coordinator.search(&args.query);

    let mut printed = 0;
    loop {
        if !args.json {
            let results = &coordinator.snapshot().results;
            for (index, result) in results.iter().enumerate().skip(printed) {
                print_result(index, result);
            }
            printed = results.len();
        }
        if !coordinator.next_update().await {
            break;
        }
    }

    let snapshot = coordinator.snapshot();
    let instance = coordinator.instance();
    if args.json {
        let mut value = snapshot_json(snapshot);
        value["searchUrl"] = query_url(instance, &snapshot.query)?.to_string().into();
        let output = serde_json::to_string_pretty(&value)
            .context("Failed to serialize results to JSON")?;
        println!("{}", output);
    } else {
        print_summary(snapshot);
        let link = LinkBuilder::new("search").link(
            instance,
            "/search",
            &[("q", snapshot.query.as_str())],
        )?;
        println!("\nView on {}: {}", instance_name(instance), link);
    }

    match &snapshot.last_error {
        Some(error) => Err(anyhow!("Search failed: {}", error)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_instance_applies_flags() {
        let config = AppConfig::default();
        let instance = resolve_instance(&config, false, Some("regexp"), Some(5)).unwrap();
        assert_eq!(instance.pattern_type, PatternType::Regexp);
        assert_eq!(instance.max_results, Some(5));
    }

    #[test]
    fn test_resolve_instance_rejects_unknown_pattern() {
        let config = AppConfig::default();
        assert!(resolve_instance(&config, false, Some("fuzzy"), None).is_err());
    }
}
