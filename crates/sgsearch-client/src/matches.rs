//! Search match model.
//!
//! One `SearchMatch` per result entry in a `matches` event, plus the rule for
//! turning a match into a link on the instance it came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// A single search result, tagged by the wire `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchMatch {
    Repo(RepositoryMatch),
    Commit(CommitMatch),
    Path(PathMatch),
    Content(ContentMatch),
    Symbol(SymbolMatch),
    /// An entry whose `type` is unknown or whose shape does not fit its
    /// variant. The raw payload is kept so callers can still show something.
    Unsupported(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryMatch {
    pub repository: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub repo_stars: Option<u64>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub repo_last_fetched: Option<DateTime<Utc>>,
    #[serde(default)]
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMatch {
    #[serde(default)]
    pub label: String,
    /// Instance-relative link to the commit.
    pub url: String,
    /// Author and date, e.g. `alice 2 days ago`.
    #[serde(default)]
    pub detail: String,
    /// Full commit message (or diff for diff searches).
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub oid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMatch {
    pub repository: String,
    pub path: String,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// A file with one or more matching lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ContentMatchWire")]
pub struct ContentMatch {
    pub repository: String,
    pub path: String,
    pub commit: Option<String>,
    pub branches: Vec<String>,
    pub language: Option<String>,
    /// Matching lines or chunks, in server order.
    pub lines: Vec<LineMatch>,
}

/// One matching line or chunk within a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatch {
    /// Line text, or the chunk content for chunk matches.
    pub text: String,
    /// 1-based line number of the first line of `text`.
    pub line_number: u32,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub ranges: Vec<MatchRange>,
}

/// Highlighted span, 1-based lines and 0-based columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRange {
    pub start: Location,
    pub end: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMatch {
    pub repository: String,
    pub path: String,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub container_name: String,
    /// In-file anchor, possibly embedded in a full instance-relative URL.
    #[serde(default, rename = "url")]
    pub anchor: String,
    #[serde(default)]
    pub line: Option<u32>,
}

// --- Wire shapes for content matches ---
// `lineMatches[].lineNumber` and `chunkMatches[].contentStart.line` are
// 0-based on the wire.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentMatchWire {
    repository: String,
    path: String,
    #[serde(default)]
    commit: Option<String>,
    #[serde(default)]
    branches: Vec<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    line_matches: Vec<WireLineMatch>,
    #[serde(default)]
    chunk_matches: Vec<WireChunkMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLineMatch {
    line: String,
    line_number: u32,
    #[serde(default)]
    offset_and_lengths: Vec<[u32; 2]>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChunkMatch {
    content: String,
    content_start: WireLocation,
    #[serde(default)]
    ranges: Vec<WireRange>,
    #[serde(default)]
    content_truncated: bool,
}

#[derive(Deserialize)]
struct WireRange {
    start: WireLocation,
    end: WireLocation,
}

#[derive(Deserialize)]
struct WireLocation {
    line: u32,
    #[serde(default)]
    column: u32,
}

impl From<WireLocation> for Location {
    fn from(wire: WireLocation) -> Self {
        Location {
            line: wire.line.saturating_add(1),
            column: wire.column,
        }
    }
}

impl From<ContentMatchWire> for ContentMatch {
    fn from(wire: ContentMatchWire) -> Self {
        // Chunk matches supersede line matches when the server sends both.
        let lines = if wire.chunk_matches.is_empty() {
            wire.line_matches
                .into_iter()
                .map(|m| {
                    let line = m.line_number.saturating_add(1);
                    LineMatch {
                        text: m.line,
                        line_number: line,
                        truncated: false,
                        ranges: m
                            .offset_and_lengths
                            .into_iter()
                            .map(|[offset, length]| MatchRange {
                                start: Location { line, column: offset },
                                end: Location { line, column: offset.saturating_add(length) },
                            })
                            .collect(),
                    }
                })
                .collect()
        } else {
            wire.chunk_matches
                .into_iter()
                .map(|c| LineMatch {
                    text: c.content,
                    line_number: c.content_start.line.saturating_add(1),
                    truncated: c.content_truncated,
                    ranges: c
                        .ranges
                        .into_iter()
                        .map(|r| MatchRange {
                            start: r.start.into(),
                            end: r.end.into(),
                        })
                        .collect(),
                })
                .collect()
        };

        ContentMatch {
            repository: wire.repository,
            path: wire.path,
            commit: wire.commit,
            branches: wire.branches,
            language: wire.language,
            lines,
        }
    }
}

impl<'de> Deserialize<'de> for SearchMatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(SearchMatch::from_value(raw))
    }
}

impl SearchMatch {
    /// Interpret one raw match entry. Never fails: anything that cannot be
    /// read as a known variant becomes `Unsupported`.
    pub fn from_value(raw: Value) -> Self {
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let parsed = match kind.as_str() {
            "repo" => serde_json::from_value(raw.clone()).map(SearchMatch::Repo),
            "commit" => serde_json::from_value(raw.clone()).map(SearchMatch::Commit),
            "path" => serde_json::from_value(raw.clone()).map(SearchMatch::Path),
            "content" => serde_json::from_value(raw.clone()).map(SearchMatch::Content),
            "symbol" => serde_json::from_value(raw.clone()).map(SearchMatch::Symbol),
            other => {
                warn!("Unsupported match type '{}'", other);
                return SearchMatch::Unsupported(raw);
            }
        };
        parsed.unwrap_or_else(|e| {
            warn!("Could not read '{}' match: {}", kind, e);
            SearchMatch::Unsupported(raw)
        })
    }

    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchMatch::Repo(_) => "repo",
            SearchMatch::Commit(_) => "commit",
            SearchMatch::Path(_) => "path",
            SearchMatch::Content(_) => "content",
            SearchMatch::Symbol(_) => "symbol",
            SearchMatch::Unsupported(_) => "unsupported",
        }
    }

    pub fn repository(&self) -> Option<&str> {
        match self {
            SearchMatch::Repo(m) => Some(&m.repository),
            SearchMatch::Commit(m) => m.repository.as_deref(),
            SearchMatch::Path(m) => Some(&m.repository),
            SearchMatch::Content(m) => Some(&m.repository),
            SearchMatch::Symbol(m) => Some(&m.repository),
            SearchMatch::Unsupported(raw) => raw.get("repository").and_then(Value::as_str),
        }
    }

    /// Number of sub-matches a caller would drill into. Content and symbol
    /// matches with more than one entry link to the file, not a line.
    pub fn sub_match_count(&self) -> usize {
        match self {
            SearchMatch::Content(m) => m.lines.len(),
            SearchMatch::Symbol(m) => m.symbols.len(),
            _ => 1,
        }
    }
}

/// A match paired with its link on the instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub search_match: SearchMatch,
}

impl SearchResult {
    pub fn new(base_url: &str, search_match: SearchMatch) -> Self {
        Self {
            url: url_for(base_url, &search_match),
            search_match,
        }
    }
}

/// Link to `search_match` on the instance at `base_url`.
///
/// Content and symbol matches with exactly one sub-match get an in-file
/// anchor; with several, the file URL is returned and callers drill in.
pub fn url_for(base_url: &str, search_match: &SearchMatch) -> String {
    let base = base_url.trim_end_matches('/');
    match search_match {
        SearchMatch::Repo(m) => {
            format!("{}/{}{}", base, m.repository, revision_suffix(&m.branches, None))
        }
        SearchMatch::Commit(m) => {
            if m.url.starts_with("http://") || m.url.starts_with("https://") {
                m.url.clone()
            } else if m.url.starts_with('/') {
                format!("{}{}", base, m.url)
            } else {
                format!("{}/{}", base, m.url)
            }
        }
        SearchMatch::Path(m) => {
            file_url(base, &m.repository, &m.path, &m.branches, m.commit.as_deref())
        }
        SearchMatch::Content(m) => {
            let url = file_url(base, &m.repository, &m.path, &m.branches, m.commit.as_deref());
            match m.lines.as_slice() {
                [only] => format!("{}#L{}", url, only.line_number),
                _ => url,
            }
        }
        SearchMatch::Symbol(m) => {
            let url = file_url(base, &m.repository, &m.path, &m.branches, m.commit.as_deref());
            match m.symbols.as_slice() {
                [only] => symbol_url(base, url, &only.anchor),
                _ => url,
            }
        }
        SearchMatch::Unsupported(_) => base.to_string(),
    }
}

fn revision_suffix(branches: &[String], commit: Option<&str>) -> String {
    match branches.first().map(String::as_str).or(commit) {
        Some(rev) if !rev.is_empty() => format!("@{}", rev),
        _ => String::new(),
    }
}

fn file_url(
    base: &str,
    repository: &str,
    path: &str,
    branches: &[String],
    commit: Option<&str>,
) -> String {
    format!(
        "{}/{}{}/-/blob/{}",
        base,
        repository,
        revision_suffix(branches, commit),
        path
    )
}

fn symbol_url(base: &str, file_url: String, anchor: &str) -> String {
    if anchor.is_empty() {
        return file_url;
    }
    match anchor.split_once('#') {
        Some((_, fragment)) => format!("{}#{}", file_url, fragment),
        None if anchor.starts_with('/') => format!("{}{}", base, anchor),
        None => format!("{}#{}", file_url, anchor),
    }
}
