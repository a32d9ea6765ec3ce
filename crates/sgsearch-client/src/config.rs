use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StreamError};

/// Base URL of Sourcegraph.com.
pub const DOTCOM_URL: &str = "https://sourcegraph.com";
/// Default number of results the server is asked to display.
pub const DEFAULT_DISPLAY_LIMIT: usize = 50;
/// Protocol version sent as the `v` stream parameter.
pub const STREAM_API_VERSION: &str = "V2";
const REQUESTED_WITH: &str = concat!("sgsearch ", env!("CARGO_PKG_VERSION"));

/// How the access token is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// `Authorization: token <token>` (access tokens)
    #[default]
    Token,
    /// `Authorization: Bearer <token>` (OAuth tokens)
    Bearer,
}

/// Query syntax mode, sent as the `t` stream parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Literal,
    #[default]
    Keyword,
    Regexp,
    Structural,
    Standard,
    Nls,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Literal => "literal",
            PatternType::Keyword => "keyword",
            PatternType::Regexp => "regexp",
            PatternType::Structural => "structural",
            PatternType::Standard => "standard",
            PatternType::Nls => "nls",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "literal" => Ok(PatternType::Literal),
            "keyword" => Ok(PatternType::Keyword),
            "regexp" | "regex" => Ok(PatternType::Regexp),
            "structural" => Ok(PatternType::Structural),
            "standard" => Ok(PatternType::Standard),
            "nls" => Ok(PatternType::Nls),
            other => Err(StreamError::Configuration(format!(
                "Unknown pattern type '{}'",
                other
            ))),
        }
    }
}

/// Connection settings for one Sourcegraph instance.
///
/// The crate never resolves these itself; callers build an `Instance` from
/// whatever preference or config source they use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Base URL of the instance, without a trailing slash.
    pub url: String,
    /// Access token, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// How the token is sent.
    #[serde(default)]
    pub token_kind: TokenKind,
    /// Search context injected into queries that do not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_context: Option<String>,
    /// Outbound proxy for all requests to this instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Query syntax mode for new searches.
    #[serde(default)]
    pub pattern_type: PatternType,
    /// Result cap sent to the server as `display`.
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
    /// Client-side cap on accumulated results. `None` keeps everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

fn default_display_limit() -> usize {
    DEFAULT_DISPLAY_LIMIT
}

impl Default for Instance {
    fn default() -> Self {
        Self::dotcom()
    }
}

impl Instance {
    /// Create settings for the instance at `url`. A trailing slash is dropped.
    pub fn new<S: Into<String>>(url: S) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            token: None,
            token_kind: TokenKind::default(),
            default_context: None,
            proxy: None,
            pattern_type: PatternType::default(),
            display_limit: DEFAULT_DISPLAY_LIMIT,
            max_results: None,
        }
    }

    /// Settings for Sourcegraph.com.
    pub fn dotcom() -> Self {
        Self::new(DOTCOM_URL)
    }

    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self.token_kind = TokenKind::Token;
        self
    }

    pub fn with_bearer_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self.token_kind = TokenKind::Bearer;
        self
    }

    pub fn with_default_context<S: Into<String>>(mut self, context: S) -> Self {
        self.default_context = Some(context.into());
        self
    }

    pub fn with_proxy<S: Into<String>>(mut self, proxy: S) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_pattern_type(mut self, pattern_type: PatternType) -> Self {
        self.pattern_type = pattern_type;
        self
    }

    pub fn with_display_limit(mut self, display_limit: usize) -> Self {
        self.display_limit = display_limit;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Value of the `Authorization` header, if a non-empty token is configured.
    pub fn authorization_header(&self) -> Option<String> {
        let token = self.token.as_deref().filter(|t| !t.is_empty())?;
        Some(match self.token_kind {
            TokenKind::Token => format!("token {}", token),
            TokenKind::Bearer => format!("Bearer {}", token),
        })
    }

    /// Build the streaming search URL for `request`.
    pub fn stream_url(&self, request: &StreamRequest) -> Result<Url> {
        let mut url = self.endpoint("/search/stream")?;
        url.query_pairs_mut()
            .append_pair("q", &request.query)
            .append_pair("v", STREAM_API_VERSION)
            .append_pair("t", request.pattern_type.as_str())
            .append_pair("display", &request.display_limit.to_string());
        Ok(url)
    }

    /// Join `path` onto the instance base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Url::parse(&format!("{}{}", self.url, path)).map_err(|e| {
            StreamError::Configuration(format!("Invalid instance URL '{}': {}", self.url, e))
        })
    }

    /// Build an HTTP client that honours the configured proxy and sends the
    /// instance's identifying headers.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "X-Requested-With",
            reqwest::header::HeaderValue::from_static(REQUESTED_WITH),
        );
        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(proxy) = self.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                StreamError::Configuration(format!("Invalid proxy '{}': {}", proxy, e))
            })?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| StreamError::Configuration(format!("Failed to create HTTP client: {}", e)))
    }

    /// A request for `query` using this instance's pattern type and display cap.
    pub fn request<S: Into<String>>(&self, query: S) -> StreamRequest {
        StreamRequest {
            query: query.into(),
            pattern_type: self.pattern_type,
            display_limit: self.display_limit,
        }
    }
}

/// Parameters of one streaming search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Query text as dispatched, after any context injection.
    pub query: String,
    pub pattern_type: PatternType,
    pub display_limit: usize,
}
