//! Links back into the Sourcegraph web UI.

use reqwest::Url;

use crate::config::{Instance, DOTCOM_URL};
use crate::error::Result;

const UTM_SOURCE: &str = "sgsearch";

/// Whether `url` is Sourcegraph.com.
pub fn is_dotcom(url: &str) -> bool {
    url.trim_end_matches('/') == DOTCOM_URL
}

/// Display name for `instance`: `Sourcegraph.com` or the URL host.
pub fn instance_name(instance: &Instance) -> String {
    if is_dotcom(&instance.url) {
        return "Sourcegraph.com".to_string();
    }
    Url::parse(&instance.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| instance.url.clone())
}

/// Link to the instance's results page for `query`.
pub fn query_url(instance: &Instance, query: &str) -> Result<Url> {
    let mut url = instance.endpoint("/")?;
    url.query_pairs_mut().append_pair("q", query);
    Ok(url)
}

/// Builds instance links tagged with the command that produced them.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    command: String,
}

impl LinkBuilder {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Link to `path` on `instance` with UTM parameters plus `params`.
    /// Later parameters replace earlier ones with the same key.
    pub fn link(&self, instance: &Instance, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = instance.endpoint(path)?;
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let mut set = |key: &str, value: &str| {
            pairs.retain(|(k, _)| k != key);
            pairs.push((key.to_string(), value.to_string()));
        };
        set("utm_source", UTM_SOURCE);
        set("utm_campaign", &self.command);
        for (key, value) in params {
            set(key, value);
        }
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
        Ok(url)
    }
}
