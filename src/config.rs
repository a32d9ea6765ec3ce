//! Application configuration.
//!
//! Settings for Sourcegraph.com and an optional custom instance, loaded from
//! a `config.toml` file in the user's config directory.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::{debug, info};

use sgsearch_client::config::DEFAULT_DISPLAY_LIMIT;
use sgsearch_client::{Instance, PatternType};

const APP_NAME: &str = "sgsearch";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable pointing at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "SGSEARCH_CONFIG_PATH";
/// Environment variable overriding the custom instance URL.
pub const ENDPOINT_ENV: &str = "SRC_ENDPOINT";
/// Environment variable overriding the custom instance token.
pub const ACCESS_TOKEN_ENV: &str = "SRC_ACCESS_TOKEN";

/// Settings for Sourcegraph.com.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DotcomConfig {
    /// Access token for Sourcegraph.com.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Search context applied to queries that do not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_context: Option<String>,
}

/// Settings for a self-hosted Sourcegraph instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CustomInstanceConfig {
    /// Base URL of the instance.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_context: Option<String>,
    /// Outbound proxy used for every request to this instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

/// Main application configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub dotcom: DotcomConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomInstanceConfig>,
    /// Query syntax used unless a command overrides it.
    #[serde(default)]
    pub pattern_type: PatternType,
    /// Result cap sent to the server.
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
    /// Client-side cap on results kept per search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

fn default_display_limit() -> usize {
    DEFAULT_DISPLAY_LIMIT
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dotcom: DotcomConfig::default(),
            custom: None,
            pattern_type: PatternType::default(),
            display_limit: default_display_limit(),
            max_results: None,
        }
    }
}

impl AppConfig {
    /// Connection settings for Sourcegraph.com.
    pub fn dotcom_instance(&self) -> Instance {
        let mut instance = self.apply_search_settings(Instance::dotcom());
        if let Some(token) = non_empty(&self.dotcom.token) {
            instance = instance.with_token(token);
        }
        if let Some(context) = non_empty(&self.dotcom.default_context) {
            instance = instance.with_default_context(context);
        }
        instance
    }

    /// Connection settings for the custom instance, if one is configured.
    pub fn custom_instance(&self) -> Option<Instance> {
        let custom = self.custom.as_ref().filter(|c| !c.url.trim().is_empty())?;
        let mut instance = self.apply_search_settings(Instance::new(custom.url.trim()));
        if let Some(token) = non_empty(&custom.token) {
            instance = instance.with_token(token);
        }
        if let Some(context) = non_empty(&custom.default_context) {
            instance = instance.with_default_context(context);
        }
        if let Some(proxy) = non_empty(&custom.proxy) {
            instance = instance.with_proxy(proxy);
        }
        Some(instance)
    }

    /// The instance commands talk to: the custom instance when configured,
    /// unless `prefer_dotcom` is set.
    pub fn instance(&self, prefer_dotcom: bool) -> Instance {
        if prefer_dotcom {
            return self.dotcom_instance();
        }
        self.custom_instance()
            .unwrap_or_else(|| self.dotcom_instance())
    }

    /// Override the custom instance URL and token. An endpoint that is not
    /// already configured creates the custom instance.
    pub fn apply_overrides(&mut self, endpoint: Option<&str>, token: Option<&str>) {
        if let Some(endpoint) = endpoint.map(str::trim).filter(|e| !e.is_empty()) {
            debug!("Overriding custom instance URL with {}", endpoint);
            match self.custom.as_mut() {
                Some(custom) => custom.url = endpoint.to_string(),
                None => {
                    self.custom = Some(CustomInstanceConfig {
                        url: endpoint.to_string(),
                        token: None,
                        default_context: None,
                        proxy: None,
                    })
                }
            }
        }
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(custom) = self.custom.as_mut() {
                custom.token = Some(token.to_string());
            }
        }
    }

    /// [`apply_overrides`](Self::apply_overrides) from `SRC_ENDPOINT` and
    /// `SRC_ACCESS_TOKEN`.
    pub fn apply_env_overrides(&mut self) {
        let endpoint = std::env::var(ENDPOINT_ENV).ok();
        let token = std::env::var(ACCESS_TOKEN_ENV).ok();
        self.apply_overrides(endpoint.as_deref(), token.as_deref());
    }

    fn apply_search_settings(&self, instance: Instance) -> Instance {
        let instance = instance
            .with_pattern_type(self.pattern_type)
            .with_display_limit(self.display_limit);
        match self.max_results {
            Some(max) => instance.with_max_results(max),
            None => instance,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Returns the default path of the configuration file.
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not find config directory"))?
        .join(APP_NAME);
    Ok(config_dir.join(CONFIG_FILE_NAME))
}

/// Resolves the configuration file path: an explicit override first, then
/// `SGSEARCH_CONFIG_PATH`, then the default location.
pub fn get_config_path_or_default(override_path: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        debug!("Using override config path: {}", path.display());
        return Ok(path.clone());
    }
    if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
        if !env_path.trim().is_empty() {
            debug!("Using config path from ENV: {}", env_path);
            return Ok(PathBuf::from(env_path));
        }
    }
    get_config_path()
}

/// Loads the configuration. A missing file yields the defaults; a file that
/// exists but cannot be read or parsed is an error.
pub fn load_config(override_path: Option<&PathBuf>) -> Result<AppConfig> {
    let config_file_path = get_config_path_or_default(override_path)?;
    if !config_file_path.exists() {
        debug!(
            "Config file not found at '{}'. Using defaults.",
            config_file_path.display()
        );
        return Ok(AppConfig::default());
    }

    info!("Loading config from '{}'", config_file_path.display());
    let config_content = fs::read_to_string(&config_file_path).with_context(|| {
        format!("Failed to read config file at '{}'", config_file_path.display())
    })?;
    toml::from_str(&config_content).with_context(|| {
        format!("Failed to parse config file at '{}'", config_file_path.display())
    })
}

/// Saves the configuration, creating the parent directory if needed.
pub fn save_config(config: &AppConfig, override_path: Option<&PathBuf>) -> Result<PathBuf> {
    let config_file_path = get_config_path_or_default(override_path)?;
    let app_config_dir = config_file_path
        .parent()
        .ok_or_else(|| anyhow!("Invalid config file path provided or determined"))?;

    fs::create_dir_all(app_config_dir).with_context(|| {
        format!("Failed to create config directory: {}", app_config_dir.display())
    })?;

    let config_content = toml::to_string_pretty(config)
        .with_context(|| "Failed to serialize configuration to TOML")?;
    fs::write(&config_file_path, config_content).with_context(|| {
        format!("Failed to write config file to '{}'", config_file_path.display())
    })?;
    info!("Saved config to '{}'", config_file_path.display());
    Ok(config_file_path)
}
