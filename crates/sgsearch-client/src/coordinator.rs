//! Search coordinator: one live session at a time, one consistent snapshot.
//!
//! Sessions run on the Tokio runtime and report back through an mpsc channel.
//! Every message is tagged with the id of the session that produced it; the
//! coordinator applies a message only while that session is the active one, so
//! a superseded session can never leak into the snapshot even if it races the
//! cancellation.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::client::Connector;
use crate::config::{Instance, PatternType};
use crate::error::StreamError;
use crate::matches::SearchResult;
use crate::session::{
    Alert, Progress, SearchHandler, SessionOutcome, SessionState, StreamSession, Suggestion,
    SuggestionPlacement,
};

static CONTEXT_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"context:\S+").expect("context filter pattern is valid"));

/// Prefix `context:<default> ` unless the query already names a context.
pub fn augment_query(query: &str, default_context: Option<&str>) -> String {
    match default_context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) if !CONTEXT_FILTER.is_match(query) => format!("context:{} {}", context, query),
        _ => query.to_string(),
    }
}

/// Everything the caller renders for the current search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSnapshot {
    /// Query as dispatched, after context injection.
    pub query: String,
    pub results: Vec<SearchResult>,
    pub suggestions: Vec<Suggestion>,
    pub alert: Option<Alert>,
    pub progress: Option<Progress>,
    /// `Found N results in D`, from the latest progress event.
    pub summary: String,
    /// Set when the client-side result cap was hit.
    pub summary_detail: Option<String>,
    pub is_loading: bool,
    pub last_error: Option<StreamError>,
    pub state: SessionState,
}

impl Default for SearchSnapshot {
    fn default() -> Self {
        Self {
            query: String::new(),
            results: Vec::new(),
            suggestions: Vec::new(),
            alert: None,
            progress: None,
            summary: String::new(),
            summary_detail: None,
            is_loading: false,
            last_error: None,
            state: SessionState::Idle,
        }
    }
}

#[derive(Debug)]
enum SessionUpdate {
    Results(Vec<SearchResult>),
    Suggestions(Vec<Suggestion>, SuggestionPlacement),
    Alert(Alert),
    Progress(Progress),
    State(SessionState),
    Finished(SessionOutcome),
}

#[derive(Debug)]
struct SessionMessage {
    session_id: u64,
    update: SessionUpdate,
}

/// Handler given to each spawned session. Forwards everything to the
/// coordinator tagged with the session id, and goes silent once cancelled.
/// A sink dropped before `finish` reports the session as failed.
struct SessionSink {
    session_id: u64,
    cancel: CancellationToken,
    tx: UnboundedSender<SessionMessage>,
    finished: bool,
}

impl SessionSink {
    fn send(&self, update: SessionUpdate) {
        if self.cancel.is_cancelled() {
            trace!(session = self.session_id, "Dropping update from cancelled session");
            return;
        }
        // The coordinator may already be gone; nothing left to notify.
        let _ = self.tx.send(SessionMessage {
            session_id: self.session_id,
            update,
        });
    }

    fn finish(mut self, outcome: SessionOutcome) {
        self.send(SessionUpdate::Finished(outcome));
        self.finished = true;
    }
}

impl Drop for SessionSink {
    fn drop(&mut self) {
        if self.finished || self.cancel.is_cancelled() {
            return;
        }
        error!(session = self.session_id, "Search session ended without an outcome");
        self.send(SessionUpdate::Finished(SessionOutcome::Failed(
            StreamError::Connection("search session ended unexpectedly".to_string()),
        )));
    }
}

impl SearchHandler for SessionSink {
    fn on_results(&mut self, results: Vec<SearchResult>) {
        self.send(SessionUpdate::Results(results));
    }

    fn on_suggestions(&mut self, suggestions: Vec<Suggestion>, placement: SuggestionPlacement) {
        self.send(SessionUpdate::Suggestions(suggestions, placement));
    }

    fn on_alert(&mut self, alert: Alert) {
        self.send(SessionUpdate::Alert(alert));
    }

    fn on_progress(&mut self, progress: Progress) {
        self.send(SessionUpdate::Progress(progress));
    }

    fn on_state_change(&mut self, state: SessionState) {
        self.send(SessionUpdate::State(state));
    }
}

/// The single live session. Dropping it cancels the session.
struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!(session = self.id, "Cancelling superseded session");
            self.cancel.cancel();
        }
    }
}

pub struct SearchCoordinator {
    instance: Instance,
    connector: Arc<dyn Connector>,
    runtime: Handle,
    next_id: u64,
    active: Option<ActiveSession>,
    previous_search: Option<String>,
    snapshot: SearchSnapshot,
    tx: UnboundedSender<SessionMessage>,
    rx: UnboundedReceiver<SessionMessage>,
    watch_tx: watch::Sender<SearchSnapshot>,
}

impl SearchCoordinator {
    /// Create a coordinator. Must be called from within a Tokio runtime;
    /// sessions are spawned onto it.
    pub fn new(instance: Instance, connector: Arc<dyn Connector>) -> Self {
        Self::with_runtime(instance, connector, Handle::current())
    }

    pub fn with_runtime(instance: Instance, connector: Arc<dyn Connector>, runtime: Handle) -> Self {
        let (tx, rx) = unbounded_channel();
        let (watch_tx, _) = watch::channel(SearchSnapshot::default());
        Self {
            instance,
            connector,
            runtime,
            next_id: 0,
            active: None,
            previous_search: None,
            snapshot: SearchSnapshot::default(),
            tx,
            rx,
            watch_tx,
        }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Switch the query syntax for subsequent searches. The next `search`
    /// call runs even if its text is unchanged.
    pub fn set_pattern_type(&mut self, pattern_type: PatternType) {
        self.instance.pattern_type = pattern_type;
        self.previous_search = None;
    }

    /// Start searching for `text`, superseding any search in flight.
    ///
    /// Repeating the previous text (ignoring surrounding whitespace) does
    /// nothing. Updates arrive through [`next_update`](Self::next_update).
    pub fn search(&mut self, text: &str) {
        let trimmed = text.trim();
        if self.previous_search.as_deref() == Some(trimmed) {
            debug!(query = %trimmed, "Skipping repeated search");
            return;
        }
        self.previous_search = Some(trimmed.to_string());

        // Cancels the previous session before anything of the new one exists.
        self.active = None;
        self.next_id += 1;
        let id = self.next_id;

        if trimmed.is_empty() {
            self.replace_snapshot(SearchSnapshot::default());
            return;
        }

        let query = augment_query(trimmed, self.instance.default_context.as_deref());
        info!(session = id, query = %query, "Starting search");
        self.replace_snapshot(SearchSnapshot {
            query: query.clone(),
            is_loading: true,
            state: SessionState::Connecting,
            ..SearchSnapshot::default()
        });

        let request = self.instance.request(query);
        let cancel = CancellationToken::new();
        let sink = SessionSink {
            session_id: id,
            cancel: cancel.clone(),
            tx: self.tx.clone(),
            finished: false,
        };
        let connector = self.connector.clone();
        let base_url = self.instance.url.clone();
        let run_cancel = cancel.clone();
        let task = self.runtime.spawn(async move {
            let mut session = StreamSession::new(id, base_url, sink);
            let outcome = session
                .run(connector.as_ref(), &request, &run_cancel)
                .await;
            session.into_handler().finish(outcome);
        });

        self.active = Some(ActiveSession {
            id,
            cancel,
            _task: task,
        });
    }

    /// Abort the search in flight. Results gathered so far stay visible.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            info!(session = active.id, "Search cancelled");
        }
        self.previous_search = None;
        if self.snapshot.state.is_active() {
            self.snapshot.state = SessionState::Aborted;
        }
        self.snapshot.is_loading = false;
        self.publish();
    }

    pub fn snapshot(&self) -> &SearchSnapshot {
        &self.snapshot
    }

    /// Watch the snapshot. The receiver sees every published version.
    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.watch_tx.subscribe()
    }

    /// Number of searches started so far. Repeated queries do not count.
    pub fn generation(&self) -> u64 {
        self.next_id
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Wait for the next update of the active session and apply it. Returns
    /// `false` when no session is active.
    pub async fn next_update(&mut self) -> bool {
        if self.active.is_none() {
            return false;
        }
        match self.rx.recv().await {
            Some(message) => {
                self.apply(message);
                true
            }
            None => false,
        }
    }

    /// Apply every update already queued, without waiting.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.apply(message);
            applied += 1;
        }
        applied
    }

    /// Process updates until the active session ends.
    pub async fn wait_until_idle(&mut self) -> &SearchSnapshot {
        while self.next_update().await {}
        &self.snapshot
    }

    fn apply(&mut self, message: SessionMessage) {
        let active_id = self.active.as_ref().map(|a| a.id);
        if active_id != Some(message.session_id) {
            trace!(session = message.session_id, "Ignoring update from stale session");
            return;
        }

        match message.update {
            SessionUpdate::Results(results) => self.append_results(results),
            SessionUpdate::Suggestions(suggestions, SuggestionPlacement::Top) => {
                let mut merged = suggestions;
                merged.append(&mut self.snapshot.suggestions);
                self.snapshot.suggestions = merged;
            }
            SessionUpdate::Suggestions(suggestions, SuggestionPlacement::Bottom) => {
                self.snapshot.suggestions.extend(suggestions);
            }
            SessionUpdate::Alert(alert) => self.snapshot.alert = Some(alert),
            SessionUpdate::Progress(progress) => {
                self.snapshot.summary = progress.summary();
                self.snapshot.progress = Some(progress);
            }
            SessionUpdate::State(state) => self.snapshot.state = state,
            SessionUpdate::Finished(outcome) => {
                self.snapshot.state = outcome.state();
                self.snapshot.is_loading = false;
                if let SessionOutcome::Failed(error) = outcome {
                    self.snapshot.last_error = Some(error);
                }
                self.active = None;
            }
        }
        self.publish();
    }

    fn append_results(&mut self, mut results: Vec<SearchResult>) {
        if let Some(max) = self.instance.max_results {
            let room = max.saturating_sub(self.snapshot.results.len());
            if results.len() > room {
                results.truncate(room);
                self.snapshot.summary_detail = Some(format!("{} results shown", max));
            }
        }
        self.snapshot.results.extend(results);
    }

    fn replace_snapshot(&mut self, snapshot: SearchSnapshot) {
        self.snapshot = snapshot;
        self.publish();
    }

    fn publish(&self) {
        self.watch_tx.send_replace(self.snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RawEventStream, ScriptedConnector};
    use crate::config::StreamRequest;
    use crate::event::RawEvent;
    use std::time::Duration;

    struct PanickingConnector;

    #[async_trait::async_trait]
    impl Connector for PanickingConnector {
        async fn connect(&self, _request: &StreamRequest) -> crate::error::Result<RawEventStream> {
            panic!("connector failed");
        }
    }

    #[test]
    fn test_augment_query() {
        assert_eq!(augment_query("bar", Some("mycontext")), "context:mycontext bar");
        assert_eq!(augment_query("context:other bar", Some("mycontext")), "context:other bar");
        assert_eq!(augment_query("bar", None), "bar");
        assert_eq!(augment_query("bar", Some("  ")), "bar");
        // A bare `context:` is not a context filter.
        assert_eq!(augment_query("context: bar", Some("global")), "context:global context: bar");
    }

    fn coordinator(connector: ScriptedConnector) -> SearchCoordinator {
        SearchCoordinator::new(Instance::new("https://sg.example.com"), Arc::new(connector))
    }

    #[tokio::test]
    async fn test_stale_sink_cannot_touch_snapshot() {
        let connector = ScriptedConnector::default();
        let _first = connector.push_channel();
        let _second = connector.push_channel();
        let mut coordinator = coordinator(connector);

        coordinator.search("first");
        let stale_id = coordinator.active.as_ref().map(|a| a.id).unwrap();
        coordinator.search("second");

        // A sink that slipped past cancellation still cannot reach the snapshot.
        coordinator.apply(SessionMessage {
            session_id: stale_id,
            update: SessionUpdate::Results(vec![SearchResult::new(
                "https://sg.example.com",
                crate::matches::SearchMatch::from_value(serde_json::json!({"type": "repo", "repository": "stale"})),
            )]),
        });
        assert!(coordinator.snapshot().results.is_empty());
        assert!(coordinator.snapshot().is_loading);
        assert_eq!(coordinator.snapshot().query, "second");
    }

    #[tokio::test]
    async fn test_cancelled_sink_sends_nothing() {
        let (tx, mut rx) = unbounded_channel();
        let cancel = CancellationToken::new();
        let mut sink = SessionSink {
            session_id: 1,
            cancel: cancel.clone(),
            tx,
            finished: false,
        };
        sink.on_alert(Alert {
            title: "before".to_string(),
            description: None,
        });
        cancel.cancel();
        sink.on_alert(Alert {
            title: "after".to_string(),
            description: None,
        });
        sink.finish(SessionOutcome::Aborted);

        let first = rx.try_recv().unwrap();
        assert!(matches!(first.update, SessionUpdate::Alert(ref a) if a.title == "before"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_result_cap_sets_summary_detail() {
        let connector = ScriptedConnector::new(vec![
            RawEvent::new(
                "matches",
                r#"[{"type":"repo","repository":"a"},{"type":"repo","repository":"b"}]"#,
            ),
            RawEvent::new("matches", r#"[{"type":"repo","repository":"c"}]"#),
            RawEvent::new("done", ""),
        ]);
        let mut coordinator = SearchCoordinator::new(
            Instance::new("https://sg.example.com").with_max_results(2),
            Arc::new(connector),
        );
        coordinator.search("repo:");
        let snapshot = coordinator.wait_until_idle().await;
        assert_eq!(snapshot.results.len(), 2);
        assert_eq!(snapshot.summary_detail.as_deref(), Some("2 results shown"));
        assert_eq!(snapshot.state, SessionState::Done);
    }

    #[tokio::test]
    async fn test_empty_query_opens_no_session() {
        let connector = Arc::new(ScriptedConnector::default());
        let mut coordinator =
            SearchCoordinator::new(Instance::new("https://sg.example.com"), connector.clone());
        coordinator.search("   ");
        assert!(!coordinator.is_active());
        assert!(!coordinator.snapshot().is_loading);
        assert_eq!(connector.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_reset_and_completion() {
        let connector = ScriptedConnector::new(vec![RawEvent::new("done", "")]);
        let mut coordinator = coordinator(connector);
        let mut updates = coordinator.subscribe();

        coordinator.search("foo");
        assert!(updates.borrow_and_update().is_loading);

        coordinator.wait_until_idle().await;
        let latest = updates.borrow_and_update().clone();
        assert!(!latest.is_loading);
        assert_eq!(latest.state, SessionState::Done);
        assert_eq!(latest.last_error, None);
    }

    #[test]
    fn test_unfinished_sink_reports_failure_on_drop() {
        let (tx, mut rx) = unbounded_channel();
        let sink = SessionSink {
            session_id: 7,
            cancel: CancellationToken::new(),
            tx,
            finished: false,
        };
        drop(sink);

        let message = rx.try_recv().unwrap();
        assert_eq!(message.session_id, 7);
        assert!(matches!(
            message.update,
            SessionUpdate::Finished(SessionOutcome::Failed(StreamError::Connection(_)))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_finished_sink_sends_outcome_once() {
        let (tx, mut rx) = unbounded_channel();
        let sink = SessionSink {
            session_id: 3,
            cancel: CancellationToken::new(),
            tx,
            finished: false,
        };
        sink.finish(SessionOutcome::Done);

        let message = rx.try_recv().unwrap();
        assert!(matches!(message.update, SessionUpdate::Finished(SessionOutcome::Done)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_panicking_session_fails_instead_of_hanging() {
        let mut coordinator = SearchCoordinator::new(
            Instance::new("https://sg.example.com"),
            Arc::new(PanickingConnector),
        );
        coordinator.search("foo");

        let snapshot = tokio::time::timeout(Duration::from_secs(5), coordinator.wait_until_idle())
            .await
            .expect("coordinator should settle after the session task dies");
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.state, SessionState::Failed);
        assert!(matches!(snapshot.last_error, Some(StreamError::Connection(_))));
        assert!(!coordinator.is_active());
    }
}
