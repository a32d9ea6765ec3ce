//! Decoding of raw server-sent events into typed search events.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Result, StreamError};
use crate::matches::SearchMatch;

pub const EVENT_MATCHES: &str = "matches";
pub const EVENT_FILTERS: &str = "filters";
pub const EVENT_ALERT: &str = "alert";
pub const EVENT_PROGRESS: &str = "progress";
pub const EVENT_DONE: &str = "done";
pub const EVENT_ERROR: &str = "error";

/// One server-sent event as it came off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub name: String,
    pub data: String,
}

impl RawEvent {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, data: D) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// A decoded streaming search event.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Matches(Vec<SearchMatch>),
    Filters(Vec<Filter>),
    Alert(AlertPayload),
    Progress(ProgressPayload),
    Done,
    Error(ErrorPayload),
    /// An event name outside the protocol. Skipped by sessions.
    Unrecognized(String),
}

/// A facet the server suggests for narrowing the query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub limit_hit: bool,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub proposed_queries: Option<Vec<ProposedQuery>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProposedQuery {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub match_count: u64,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub repositories_count: Option<u64>,
    #[serde(default)]
    pub skipped: Vec<Skipped>,
}

/// A reason the server stopped short of an exhaustive search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Skipped {
    pub reason: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,
}

/// Decode one event. An empty payload yields the empty-bodied event of that
/// name; a non-empty payload that is not valid JSON for the event is a
/// `StreamError::Decode`.
pub fn decode(event_name: &str, data: &str) -> Result<SearchEvent> {
    let payload = data.trim();
    let event = match event_name {
        EVENT_MATCHES => SearchEvent::Matches(parse_or_default(event_name, payload)?),
        EVENT_FILTERS => SearchEvent::Filters(parse_or_default(event_name, payload)?),
        EVENT_ALERT => SearchEvent::Alert(parse_or_default(event_name, payload)?),
        EVENT_PROGRESS => SearchEvent::Progress(parse_or_default(event_name, payload)?),
        EVENT_DONE => SearchEvent::Done,
        // Servers and proxies sometimes put plain text in error events.
        EVENT_ERROR => SearchEvent::Error(
            parse_or_default(event_name, payload).unwrap_or_else(|_| ErrorPayload {
                message: payload.to_string(),
            }),
        ),
        other => SearchEvent::Unrecognized(other.to_string()),
    };
    Ok(event)
}

/// Decode a raw event.
pub fn decode_raw(raw: &RawEvent) -> Result<SearchEvent> {
    decode(&raw.name, &raw.data)
}

fn parse_or_default<T: DeserializeOwned + Default>(event: &str, payload: &str) -> Result<T> {
    if payload.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(payload).map_err(|e| StreamError::Decode {
        event: event.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payloads_decode_to_empty_events() {
        assert_eq!(decode("matches", "").unwrap(), SearchEvent::Matches(vec![]));
        assert_eq!(decode("filters", "  ").unwrap(), SearchEvent::Filters(vec![]));
        assert_eq!(decode("progress", "").unwrap(), SearchEvent::Progress(ProgressPayload::default()));
        assert_eq!(decode("done", "").unwrap(), SearchEvent::Done);
    }

    #[test]
    fn test_done_ignores_body() {
        assert_eq!(decode("done", "{}").unwrap(), SearchEvent::Done);
    }

    #[test]
    fn test_decode_matches() {
        let data = r#"[{"type":"path","repository":"github.com/a/b","path":"README.md"},{"type":"repo","repository":"github.com/a/c"}]"#;
        let SearchEvent::Matches(matches) = decode("matches", data).unwrap() else {
            panic!("expected matches");
        };
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].kind(), "path");
        assert_eq!(matches[1].kind(), "repo");
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let err = decode("matches", "[{\"type\": ").unwrap_err();
        assert!(err.is_decode());
        assert!(matches!(err, StreamError::Decode { ref event, .. } if event == "matches"));
    }

    #[test]
    fn test_matches_payload_must_be_an_array() {
        let err = decode("matches", r#"{"type":"repo"}"#).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_decode_alert_with_proposed_queries() {
        let data = r#"{"title":"No results","description":"Try this","proposedQueries":[{"description":"drop the filter","query":"foo"}]}"#;
        let SearchEvent::Alert(alert) = decode("alert", data).unwrap() else {
            panic!("expected alert");
        };
        assert_eq!(alert.title, "No results");
        let proposed = alert.proposed_queries.unwrap();
        assert_eq!(proposed[0].query, "foo");
    }

    #[test]
    fn test_decode_alert_with_null_proposed_queries() {
        let data = r#"{"title":"Heads up","proposedQueries":null}"#;
        let SearchEvent::Alert(alert) = decode("alert", data).unwrap() else {
            panic!("expected alert");
        };
        assert_eq!(alert.proposed_queries, None);
    }

    #[test]
    fn test_decode_progress() {
        let data = r#"{"done":false,"matchCount":42,"durationMs":120,"skipped":[{"reason":"shard-timedout","title":"timeout"}]}"#;
        let SearchEvent::Progress(progress) = decode("progress", data).unwrap() else {
            panic!("expected progress");
        };
        assert_eq!(progress.match_count, 42);
        assert_eq!(progress.duration_ms, 120);
        assert_eq!(progress.skipped.len(), 1);
    }

    #[test]
    fn test_error_event_accepts_plain_text() {
        assert_eq!(
            decode("error", "upstream timeout").unwrap(),
            SearchEvent::Error(ErrorPayload { message: "upstream timeout".to_string() })
        );
        assert_eq!(
            decode("error", r#"{"message":"bad query"}"#).unwrap(),
            SearchEvent::Error(ErrorPayload { message: "bad query".to_string() })
        );
    }

    #[test]
    fn test_unknown_event_name() {
        assert_eq!(
            decode("heartbeat", "{}").unwrap(),
            SearchEvent::Unrecognized("heartbeat".to_string())
        );
    }
}
