use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use crate::config::{self, AppConfig, CustomInstanceConfig};

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum ConfigCommand {
    /// Print the effective configuration with tokens masked.
    Show,
    /// Print the path of the configuration file.
    Path,
    /// Configure the custom Sourcegraph instance.
    SetInstance(SetInstanceArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SetInstanceArgs {
    /// Base URL of the instance, e.g. https://sourcegraph.example.com
    pub url: String,

    /// Access token for the instance
    #[arg(long)]
    pub token: Option<String>,

    /// Search context applied to queries that do not name one
    #[arg(long)]
    pub context: Option<String>,

    /// Outbound proxy for requests to the instance
    #[arg(long)]
    pub proxy: Option<String>,
}

pub fn handle_config_command(
    args: &ConfigArgs,
    config: &mut AppConfig,
    override_path: Option<&PathBuf>,
) -> Result<()> {
    match &args.command {
        ConfigCommand::Show => {
            let masked = masked_config(config);
            let content =
                toml::to_string_pretty(&masked).context("Failed to serialize configuration")?;
            print!("{}", content);
            Ok(())
        }
        ConfigCommand::Path => {
            let path = config::get_config_path_or_default(override_path)?;
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::SetInstance(set_args) => {
            handle_set_instance(set_args, config, override_path)
        }
    }
}

fn handle_set_instance(
    args: &SetInstanceArgs,
    config: &mut AppConfig,
    override_path: Option<&PathBuf>,
) -> Result<()> {
    let url = args.url.trim().trim_end_matches('/');
    validate_instance_url(url)?;

    config.custom = Some(CustomInstanceConfig {
        url: url.to_string(),
        token: args.token.clone(),
        default_context: args.context.clone(),
        proxy: args.proxy.clone(),
    });
    let path = config::save_config(config, override_path)?;

    println!("{}", format!("Custom instance set to {}", url).green());
    println!("Saved to {}", path.display());
    Ok(())
}

fn validate_instance_url(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        bail!("Instance URL must start with http:// or https://, got '{}'", url)
    }
}

fn mask(token: &Option<String>) -> Option<String> {
    token.as_ref().map(|t| {
        let chars: Vec<char> = t.chars().collect();
        if chars.len() > 8 {
            format!("****{}", chars[chars.len() - 4..].iter().collect::<String>())
        } else {
            "****".to_string()
        }
    })
}

fn masked_config(config: &AppConfig) -> AppConfig {
    let mut masked = config.clone();
    masked.dotcom.token = mask(&config.dotcom.token);
    if let Some(custom) = masked.custom.as_mut() {
        custom.token = mask(&custom.token);
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use tempfile::tempdir;

    #[test]
    fn test_set_instance_saves_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();

        let args = SetInstanceArgs {
            url: "https://sg.example.com/".to_string(),
            token: Some("sgp_secret".to_string()),
            context: Some("global".to_string()),
            proxy: None,
        };
        handle_set_instance(&args, &mut config, Some(&config_path)).unwrap();

        let custom = config.custom.as_ref().unwrap();
        assert_eq!(custom.url, "https://sg.example.com");

        let loaded = load_config(Some(&config_path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_set_instance_rejects_bare_host() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let mut config = AppConfig::default();
        let args = SetInstanceArgs {
            url: "sg.example.com".to_string(),
            token: None,
            context: None,
            proxy: None,
        };
        assert!(handle_set_instance(&args, &mut config, Some(&config_path)).is_err());
        assert!(!config_path.exists());
    }

    #[test]
    fn test_masked_config_hides_tokens() {
        let mut config = AppConfig::default();
        config.dotcom.token = Some("short".to_string());
        config.custom = Some(CustomInstanceConfig {
            url: "https://sg.example.com".to_string(),
            token: Some("sgp_0123456789abcd".to_string()),
            default_context: None,
            proxy: None,
        });

        let masked = masked_config(&config);
        assert_eq!(masked.dotcom.token.as_deref(), Some("****"));
        assert_eq!(masked.custom.unwrap().token.as_deref(), Some("****abcd"));
    }
}
