use std::io;
use std::sync::{Arc, Mutex};

use sgsearch_client::{
    Alert, HttpConnector, Instance, PatternType, Progress, SearchCoordinator, SearchHandler,
    SearchMatch, SearchResult, SessionOutcome, SessionState, StreamError, StreamSession,
    Suggestion, SuggestionPlacement,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(events: &[(&str, &str)]) -> String {
    events
        .iter()
        .map(|(name, data)| format!("event: {}\ndata: {}\n\n", name, data))
        .collect()
}

fn stream_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

async fn coordinator_for(instance: Instance) -> SearchCoordinator {
    let connector = Arc::new(HttpConnector::new(instance.clone()).unwrap());
    SearchCoordinator::new(instance, connector)
}

#[test_log::test(tokio::test)]
async fn test_streams_results_from_server() {
    let server = MockServer::start().await;
    let body = sse(&[
        (
            "matches",
            r#"[{"type":"content","repository":"github.com/a/b","path":"src/lib.rs","lineMatches":[{"line":"fn main() {}","lineNumber":3,"offsetAndLengths":[[3,4]]}]},{"type":"path","repository":"github.com/a/b","path":"README.md"}]"#,
        ),
        ("progress", r#"{"done":false,"matchCount":2,"durationMs":17,"skipped":[]}"#),
        (
            "filters",
            r#"[{"value":"lang:rust","label":"Rust","count":2,"limitHit":false,"kind":"lang"}]"#,
        ),
        ("done", "{}"),
    ]);
    Mock::given(method("GET"))
        .and(path("/search/stream"))
        .and(query_param("q", "context:global fn main"))
        .and(query_param("v", "V2"))
        .and(query_param("t", "regexp"))
        .and(query_param("display", "50"))
        .and(header("authorization", "token secret"))
        .and(header("accept", "text/event-stream"))
        .and(header_exists("x-requested-with"))
        .respond_with(stream_response(body))
        .expect(1)
        .mount(&server)
        .await;

    let instance = Instance::new(server.uri())
        .with_token("secret")
        .with_default_context("global")
        .with_pattern_type(PatternType::Regexp);
    let mut coordinator = coordinator_for(instance).await;

    coordinator.search("fn main");
    let snapshot = coordinator.wait_until_idle().await;

    assert_eq!(snapshot.last_error, None);
    assert_eq!(snapshot.state, SessionState::Done);
    assert_eq!(snapshot.results.len(), 2);
    assert_eq!(
        snapshot.results[0].url,
        format!("{}/github.com/a/b/-/blob/src/lib.rs#L4", server.uri())
    );
    let SearchMatch::Content(content) = &snapshot.results[0].search_match else {
        panic!("expected a content match");
    };
    assert_eq!(content.lines[0].line_number, 4);
    assert_eq!(snapshot.summary, "Found 2 results in 17ms");
    assert_eq!(snapshot.suggestions.len(), 1);
}

#[tokio::test]
async fn test_bearer_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/stream"))
        .and(header("authorization", "Bearer oauth-token"))
        .respond_with(stream_response(sse(&[("done", "{}")])))
        .expect(1)
        .mount(&server)
        .await;

    let mut coordinator =
        coordinator_for(Instance::new(server.uri()).with_bearer_token("oauth-token")).await;
    coordinator.search("foo");
    let snapshot = coordinator.wait_until_idle().await;
    assert_eq!(snapshot.state, SessionState::Done);
}

#[tokio::test]
async fn test_non_success_status_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/stream"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid access token.\n"))
        .mount(&server)
        .await;

    let mut coordinator = coordinator_for(Instance::new(server.uri()).with_token("bad")).await;
    coordinator.search("foo");
    let snapshot = coordinator.wait_until_idle().await;

    assert_eq!(snapshot.state, SessionState::Failed);
    let error = snapshot.last_error.clone().unwrap();
    assert!(error.is_transport());
    assert_eq!(
        error,
        StreamError::Http {
            status: 401,
            body: "Invalid access token.".to_string()
        }
    );
}

#[tokio::test]
async fn test_body_ending_without_done() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/stream"))
        .respond_with(stream_response(sse(&[(
            "matches",
            r#"[{"type":"repo","repository":"github.com/a/b"}]"#,
        )])))
        .mount(&server)
        .await;

    let mut coordinator = coordinator_for(Instance::new(server.uri())).await;
    coordinator.search("foo");
    let snapshot = coordinator.wait_until_idle().await;

    assert_eq!(snapshot.last_error, Some(StreamError::ClosedWithoutDone));
    assert_eq!(snapshot.results.len(), 1);
    assert!(!snapshot.is_loading);
}

#[tokio::test]
async fn test_server_error_event() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/stream"))
        .respond_with(stream_response(sse(&[(
            "error",
            r#"{"message":"invalid query: unbalanced parentheses"}"#,
        )])))
        .mount(&server)
        .await;

    let mut coordinator = coordinator_for(Instance::new(server.uri())).await;
    coordinator.search("foo(");
    let snapshot = coordinator.wait_until_idle().await;

    assert_eq!(
        snapshot.last_error,
        Some(StreamError::Server(
            "invalid query: unbalanced parentheses".to_string()
        ))
    );
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct IgnoreAll;

impl SearchHandler for IgnoreAll {
    fn on_results(&mut self, _results: Vec<SearchResult>) {}
    fn on_suggestions(&mut self, _suggestions: Vec<Suggestion>, _placement: SuggestionPlacement) {}
    fn on_alert(&mut self, _alert: Alert) {}
    fn on_progress(&mut self, _progress: Progress) {}
}

#[tokio::test]
async fn test_connector_logs_carry_session_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let instance = Instance::new(server.uri());
    let connector = HttpConnector::new(instance.clone()).unwrap();
    let mut session = StreamSession::new(42, instance.url.clone(), IgnoreAll);
    let outcome = session
        .run(&connector, &instance.request("foo"), &CancellationToken::new())
        .await;
    assert!(matches!(outcome, SessionOutcome::Failed(StreamError::Http { status: 500, .. })));

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    let connector_lines: Vec<&str> = output
        .lines()
        .filter(|line| line.contains("Connecting to") || line.contains("responded with HTTP"))
        .collect();
    assert_eq!(connector_lines.len(), 2, "captured logs:\n{}", output);
    assert!(connector_lines.iter().all(|line| line.contains("session=42")));
}
