//! One-shot, bounded searches for non-interactive callers.
//!
//! [`collect_matches`] runs a single session outside any coordinator and
//! hands back the raw matches once the server is done, the cap is reached or
//! the time budget runs out.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::Connector;
use crate::config::{Instance, PatternType};
use crate::error::Result;
use crate::matches::{SearchMatch, SearchResult};
use crate::session::{
    Alert, Progress, SearchHandler, SessionOutcome, StreamSession, Suggestion, SuggestionPlacement,
};

/// Wall-clock budget of a collection when the caller does not pick one.
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Canned search flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Keyword,
    /// Natural-language search.
    Nls,
    Commit,
    Diff,
}

impl SearchKind {
    /// Query text to send for `query`.
    pub fn query(&self, query: &str) -> String {
        match self {
            SearchKind::Keyword | SearchKind::Nls => query.to_string(),
            SearchKind::Commit => format!("type:commit {}", query),
            SearchKind::Diff => format!("type:diff {}", query),
        }
    }

    pub fn pattern_type(&self) -> PatternType {
        match self {
            SearchKind::Nls => PatternType::Nls,
            _ => PatternType::Keyword,
        }
    }
}

struct Collector {
    matches: Vec<SearchMatch>,
    max_results: usize,
    cancel: CancellationToken,
}

impl SearchHandler for Collector {
    fn on_results(&mut self, results: Vec<SearchResult>) {
        if self.matches.len() >= self.max_results {
            return;
        }
        self.matches
            .extend(results.into_iter().map(|r| r.search_match));
        if self.matches.len() >= self.max_results {
            debug!(max = self.max_results, "Collected enough matches");
            self.matches.truncate(self.max_results);
            self.cancel.cancel();
        }
    }

    fn on_suggestions(&mut self, _suggestions: Vec<Suggestion>, _placement: SuggestionPlacement) {}

    fn on_alert(&mut self, _alert: Alert) {}

    fn on_progress(&mut self, _progress: Progress) {}
}

/// Run `query` once and gather up to `max_results` matches.
///
/// Returns what was gathered when the server finishes, when the cap is
/// reached (the stream is aborted) or when `timeout` elapses. A session that
/// fails before any of those is an error.
pub async fn collect_matches<C: Connector + ?Sized>(
    connector: &C,
    instance: &Instance,
    query: &str,
    pattern_type: PatternType,
    max_results: usize,
    timeout: Duration,
) -> Result<Vec<SearchMatch>> {
    let cancel = CancellationToken::new();
    let collector = Collector {
        matches: Vec::new(),
        max_results,
        cancel: cancel.clone(),
    };
    let mut request = instance.request(query);
    request.pattern_type = pattern_type;

    let mut session = StreamSession::new(0, instance.url.clone(), collector);
    if max_results == 0 {
        session.abort();
        return Ok(Vec::new());
    }

    let outcome = match tokio::time::timeout(timeout, session.run(connector, &request, &cancel)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            info!(timeout_ms = timeout.as_millis() as u64, "Search timed out; returning partial results");
            session.abort()
        }
    };

    match outcome {
        SessionOutcome::Done | SessionOutcome::Aborted => Ok(session.into_handler().matches),
        SessionOutcome::Failed(e) => Err(e),
    }
}

/// [`collect_matches`] for a canned search flavour.
pub async fn collect_kind<C: Connector + ?Sized>(
    connector: &C,
    instance: &Instance,
    kind: SearchKind,
    query: &str,
    max_results: usize,
) -> Result<Vec<SearchMatch>> {
    collect_matches(
        connector,
        instance,
        &kind.query(query),
        kind.pattern_type(),
        max_results,
        DEFAULT_COLLECT_TIMEOUT,
    )
    .await
}
