//! Stream session: one live connection for one query.
//!
//! A `StreamSession` owns the termination state machine
//! (`Idle -> Connecting -> Open -> {Done, Aborted, Failed}`) and turns decoded
//! events into calls on its `SearchHandler`. `handle_event` is the single entry
//! point for incoming events; `run` drives it from a `Connector` until a
//! terminal state is reached.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{Connector, RawEventStream};
use crate::config::StreamRequest;
use crate::error::{Result, StreamError};
use crate::event::{
    decode_raw, AlertPayload, Filter, ProgressPayload, RawEvent, SearchEvent,
};
use crate::matches::{SearchMatch, SearchResult};

/// A hint shown when results are sparse or an alert redirects the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub title: String,
    pub description: String,
    /// Query to run instead. `None` when the suggestion is informational.
    pub query: Option<String>,
}

impl Suggestion {
    /// Whether this suggestion can be turned into a new search.
    pub fn is_actionable(&self) -> bool {
        self.query.is_some()
    }

    fn from_filter(filter: &Filter) -> Self {
        Self {
            title: format!("Filter for '{}'", filter.label),
            description: format!("{} matches", filter.count),
            query: non_empty(&filter.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub match_count: u64,
    /// Elapsed time, formatted (e.g. `120ms`).
    pub duration: String,
    /// Whether the server skipped part of the search space.
    pub skipped: bool,
}

impl Progress {
    fn from_payload(payload: &ProgressPayload) -> Self {
        Self {
            match_count: payload.match_count,
            duration: format!("{}ms", payload.duration_ms),
            skipped: !payload.skipped.is_empty(),
        }
    }

    /// `Found 42+ results in 120ms`
    pub fn summary(&self) -> String {
        format!(
            "Found {}{} results in {}",
            self.match_count,
            if self.skipped { "+" } else { "" },
            self.duration
        )
    }
}

/// Where new suggestions go in the caller's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionPlacement {
    /// Prepend: alert-proposed queries.
    Top,
    /// Append: facet filters.
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Done,
    Aborted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Aborted | SessionState::Failed)
    }

    /// Connecting or open.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The server sent `done`.
    Done,
    /// The caller cancelled. Not an error.
    Aborted,
    Failed(StreamError),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Done => SessionState::Done,
            SessionOutcome::Aborted => SessionState::Aborted,
            SessionOutcome::Failed(_) => SessionState::Failed,
        }
    }
}

/// Receives the output of one session, strictly in arrival order.
pub trait SearchHandler: Send {
    fn on_results(&mut self, results: Vec<SearchResult>);
    fn on_suggestions(&mut self, suggestions: Vec<Suggestion>, placement: SuggestionPlacement);
    fn on_alert(&mut self, alert: Alert);
    fn on_progress(&mut self, progress: Progress);
    fn on_state_change(&mut self, _state: SessionState) {}
}

/// Owns the event stream of a session and closes it at most once.
struct Transport {
    session_id: u64,
    stream: Option<RawEventStream>,
}

impl Transport {
    fn new(session_id: u64, stream: RawEventStream) -> Self {
        Self {
            session_id,
            stream: Some(stream),
        }
    }

    async fn next(&mut self) -> Option<Result<RawEvent>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            debug!(session = self.session_id, "Closed event stream");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct StreamSession<H> {
    id: u64,
    base_url: String,
    state: SessionState,
    outcome: Option<SessionOutcome>,
    handler: H,
}

impl<H: SearchHandler> StreamSession<H> {
    /// Create a session for the instance at `base_url`. The session starts in
    /// `Connecting`.
    pub fn new<S: Into<String>>(id: u64, base_url: S, handler: H) -> Self {
        let mut session = Self {
            id,
            base_url: base_url.into(),
            state: SessionState::Idle,
            outcome: None,
            handler,
        };
        session.transition(SessionState::Connecting);
        session
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// How the session ended, once it has.
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Process the next item from the transport. Returns the outcome once the
    /// session reaches a terminal state; items arriving after that are
    /// discarded.
    pub fn handle_event(&mut self, item: Result<RawEvent>) -> Option<SessionOutcome> {
        if self.state.is_terminal() {
            debug!(session = self.id, state = ?self.state, "Discarding event after terminal state");
            return None;
        }

        let event = match item.and_then(|raw| decode_raw(&raw)) {
            Ok(event) => event,
            Err(e) => return Some(self.fail(e)),
        };

        if self.state == SessionState::Connecting {
            self.transition(SessionState::Open);
        }

        match event {
            SearchEvent::Matches(matches) => {
                debug!(session = self.id, count = matches.len(), "matches");
                let results = self.to_results(matches);
                self.handler.on_results(results);
            }
            SearchEvent::Filters(filters) => {
                // Repo facets and single-occurrence facets are low-signal.
                let suggestions: Vec<Suggestion> = filters
                    .iter()
                    .filter(|f| f.kind != "repo" && f.count > 1)
                    .map(Suggestion::from_filter)
                    .collect();
                debug!(session = self.id, kept = suggestions.len(), total = filters.len(), "filters");
                self.handler.on_suggestions(suggestions, SuggestionPlacement::Bottom);
            }
            SearchEvent::Alert(alert) => self.handle_alert(alert),
            SearchEvent::Progress(progress) => {
                self.handler.on_progress(Progress::from_payload(&progress));
            }
            SearchEvent::Done => return Some(self.terminate(SessionOutcome::Done)),
            SearchEvent::Error(payload) => {
                return Some(self.fail(StreamError::Server(payload.message)));
            }
            SearchEvent::Unrecognized(name) => {
                warn!(session = self.id, event = %name, "Skipping unrecognized event");
            }
        }
        None
    }

    /// Caller-initiated cancellation.
    pub fn abort(&mut self) -> SessionOutcome {
        self.terminate(SessionOutcome::Aborted)
    }

    /// The transport ended. Without a prior `done` this is a failure.
    pub fn finish(&mut self) -> SessionOutcome {
        self.terminate(SessionOutcome::Failed(StreamError::ClosedWithoutDone))
    }

    /// Terminal failure with `error`.
    pub fn fail(&mut self, error: StreamError) -> SessionOutcome {
        self.terminate(SessionOutcome::Failed(error))
    }

    /// The first terminal outcome wins; later calls return it unchanged.
    fn terminate(&mut self, outcome: SessionOutcome) -> SessionOutcome {
        if let Some(existing) = &self.outcome {
            return existing.clone();
        }
        match &outcome {
            SessionOutcome::Done => info!(session = self.id, "Search stream done"),
            SessionOutcome::Aborted => info!(session = self.id, "Search stream aborted"),
            SessionOutcome::Failed(e) => error!(session = self.id, "Search stream failed: {}", e),
        }
        self.transition(outcome.state());
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Connect through `connector` and process events until a terminal state.
    /// Cancelling `cancel` aborts promptly and closes the connection; events
    /// that were already in flight are dropped.
    #[instrument(skip_all, fields(session = self.id))]
    pub async fn run<C: Connector + ?Sized>(
        &mut self,
        connector: &C,
        request: &StreamRequest,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        debug!(session = self.id, query = %request.query, "Opening search stream");
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.abort(),
            connected = connector.connect(request) => connected,
        };
        let mut transport = match connected {
            Ok(stream) => Transport::new(self.id, stream),
            Err(e) => return self.fail(e),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    transport.close();
                    return self.abort();
                }
                next = transport.next() => next,
            };
            match next {
                Some(item) => {
                    if let Some(outcome) = self.handle_event(item) {
                        transport.close();
                        return outcome;
                    }
                }
                None => {
                    transport.close();
                    return self.finish();
                }
            }
        }
    }

    fn handle_alert(&mut self, alert: AlertPayload) {
        info!(session = self.id, title = %alert.title, "Search alert");
        let AlertPayload {
            title,
            description,
            proposed_queries,
            ..
        } = alert;
        let suggestions: Option<Vec<Suggestion>> = proposed_queries.map(|proposed| {
            proposed
                .into_iter()
                .map(|p| Suggestion {
                    title: p
                        .description
                        .filter(|d| !d.is_empty())
                        .unwrap_or_else(|| p.query.clone()),
                    description: title.clone(),
                    query: non_empty(&p.query),
                })
                .collect()
        });
        self.handler.on_alert(Alert { title, description });
        if let Some(suggestions) = suggestions {
            self.handler.on_suggestions(suggestions, SuggestionPlacement::Top);
        }
    }

    fn to_results(&self, matches: Vec<SearchMatch>) -> Vec<SearchResult> {
        matches
            .into_iter()
            .map(|m| SearchResult::new(&self.base_url, m))
            .collect()
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = self.id, from = ?self.state, to = ?next, "Session state change");
        self.state = next;
        self.handler.on_state_change(next);
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
