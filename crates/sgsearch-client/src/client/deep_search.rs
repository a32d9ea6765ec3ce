//! Deep Search: long-running question answering over `/.api/deepsearch/v1`.
//!
//! A question is submitted with [`DeepSearchClient::start`] and answered
//! asynchronously by the server. [`DeepSearchClient::poll_until_complete`]
//! refetches the conversation until its latest question is answered or fails.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Instance;
use crate::error::{Result, StreamError};

const DEEP_SEARCH_PATH: &str = "/.api/deepsearch/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Pending,
    Processing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: u64,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub share_url: Option<String>,
    #[serde(default)]
    pub starred: bool,
}

impl Conversation {
    /// The most recently asked question.
    pub fn latest_question(&self) -> Option<&Question> {
        self.questions.last()
    }

    /// Whether the latest question has been answered or has failed.
    pub fn is_settled(&self) -> bool {
        self.latest_question().map_or(false, Question::is_settled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u64,
    #[serde(default)]
    pub conversation_id: u64,
    pub question: String,
    pub status: ConversationStatus,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub suggested_followups: Vec<String>,
    #[serde(default)]
    pub error: Option<QuestionError>,
}

impl Question {
    pub fn is_settled(&self) -> bool {
        self.status == ConversationStatus::Completed || self.error.is_some()
    }
}

/// A code location the answer cites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: String,
    pub link: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionError {
    pub title: String,
    /// `TokenLimitExceeded`, `Cancelled`, `RateLimitExceeded` or `InternalError`.
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    question: &'a str,
}

/// The list endpoint answers with either a bare array or a wrapper object.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Bare(Vec<Conversation>),
    Wrapped { conversations: Vec<Conversation> },
}

/// Polling schedule for [`DeepSearchClient::poll_until_complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    /// `None` polls until the conversation settles or the caller cancels.
    pub max_attempts: Option<u32>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(Conversation),
    Cancelled,
}

pub struct DeepSearchClient {
    instance: Instance,
    http_client: Client,
}

impl DeepSearchClient {
    pub fn new(instance: Instance) -> Result<Self> {
        let http_client = instance.http_client()?;
        Ok(Self {
            instance,
            http_client,
        })
    }

    /// Submit `question` and return the freshly created conversation.
    pub async fn start(&self, question: &str) -> Result<Conversation> {
        info!("Starting deep search");
        let response = self
            .request(Method::POST, DEEP_SEARCH_PATH)?
            .json(&StartRequest { question })
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn fetch(&self, id: u64) -> Result<Conversation> {
        let response = self
            .request(Method::GET, &format!("{}/{}", DEEP_SEARCH_PATH, id))?
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn list(&self) -> Result<Vec<Conversation>> {
        let response = self.request(Method::GET, DEEP_SEARCH_PATH)?.send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        match serde_json::from_str::<ListResponse>(&body) {
            Ok(ListResponse::Bare(conversations)) => Ok(conversations),
            Ok(ListResponse::Wrapped { conversations }) => Ok(conversations),
            Err(e) => Err(StreamError::Decode {
                event: "deep search list".to_string(),
                message: e.to_string(),
            }),
        }
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("{}/{}", DEEP_SEARCH_PATH, id))?
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Refetch conversation `id` every `options.interval` until its latest
    /// question settles. Fetch failures are logged and retried; each attempt
    /// counts against `options.max_attempts`.
    pub async fn poll_until_complete(
        &self,
        id: u64,
        options: PollOptions,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome> {
        let mut attempts: u32 = 0;
        loop {
            if let Some(max) = options.max_attempts {
                if attempts >= max {
                    warn!(conversation = id, attempts, "Deep search still unanswered");
                    return Err(StreamError::PollExhausted { attempts });
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                fetched = self.fetch(id) => {
                    attempts += 1;
                    match fetched {
                        Ok(conversation) if conversation.is_settled() => {
                            info!(conversation = id, attempts, "Deep search settled");
                            return Ok(PollOutcome::Completed(conversation));
                        }
                        Ok(conversation) => {
                            debug!(
                                conversation = id,
                                status = ?conversation.latest_question().map(|q| q.status),
                                "Deep search in progress"
                            );
                        }
                        Err(e) => warn!(conversation = id, "Deep search polling error: {}", e),
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = tokio::time::sleep(options.interval) => {}
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.instance.endpoint(path)?;
        let mut builder = self
            .http_client
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(auth) = self.instance.authorization_header() {
            builder = builder.header(AUTHORIZATION, auth);
        }
        Ok(builder)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("Unknown error").to_string()
    } else {
        body.trim().to_string()
    };
    Err(StreamError::Http {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn conversation(status: &str) -> serde_json::Value {
        let answer = (status == "completed").then_some("It uses tokens.");
        json!({
            "id": 7,
            "questions": [{
                "id": 1,
                "conversation_id": 7,
                "question": "how does auth work?",
                "status": status,
                "answer": answer,
                "sources": [{"type": "file", "link": "/a/-/blob/auth.go", "label": "auth.go"}]
            }],
            "share_url": "https://sg.example.com/deepsearch/7"
        })
    }

    async fn client(server: &MockServer) -> DeepSearchClient {
        DeepSearchClient::new(Instance::new(server.uri()).with_token("secret")).unwrap()
    }

    #[tokio::test]
    async fn test_start_posts_question_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/.api/deepsearch/v1"))
            .and(header("authorization", "token secret"))
            .and(body_json(json!({"question": "how does auth work?"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(conversation("pending")))
            .expect(1)
            .mount(&server)
            .await;

        let started = client(&server).await.start("how does auth work?").await.unwrap();
        assert_eq!(started.id, 7);
        assert_eq!(
            started.latest_question().unwrap().status,
            ConversationStatus::Pending
        );
        assert!(!started.is_settled());
    }

    #[tokio::test]
    async fn test_list_accepts_both_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.api/deepsearch/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([conversation("completed")])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/.api/deepsearch/v1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"conversations": [conversation("completed")]})),
            )
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(client.list().await.unwrap().len(), 1);
        assert_eq!(client.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.api/deepsearch/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nodes": 3})))
            .mount(&server)
            .await;

        let err = client(&server).await.list().await.unwrap_err();
        assert!(err.is_decode());
    }

    #[tokio::test]
    async fn test_delete_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/.api/deepsearch/v1/7"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = client(&server).await.delete(7).await.unwrap_err();
        assert_eq!(
            err,
            StreamError::Http {
                status: 404,
                body: "not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_poll_until_complete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.api/deepsearch/v1/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(conversation("processing")))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/.api/deepsearch/v1/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(conversation("completed")))
            .mount(&server)
            .await;

        let options = PollOptions {
            interval: Duration::from_millis(5),
            max_attempts: Some(10),
        };
        let outcome = client(&server)
            .await
            .poll_until_complete(7, options, &CancellationToken::new())
            .await
            .unwrap();
        let PollOutcome::Completed(conversation) = outcome else {
            panic!("expected a completed conversation");
        };
        assert_eq!(
            conversation.latest_question().unwrap().answer.as_deref(),
            Some("It uses tokens.")
        );
    }

    #[tokio::test]
    async fn test_poll_keeps_going_through_errors_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.api/deepsearch/v1/7"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let options = PollOptions {
            interval: Duration::from_millis(1),
            max_attempts: Some(3),
        };
        let err = client(&server)
            .await
            .poll_until_complete(7, options, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, StreamError::PollExhausted { attempts: 3 });
    }

    #[tokio::test]
    async fn test_poll_stops_on_question_error() {
        let server = MockServer::start().await;
        let mut body = conversation("processing");
        body["questions"][0]["error"] = json!({
            "title": "Too long",
            "kind": "TokenLimitExceeded",
            "message": "The answer exceeded the token limit"
        });
        Mock::given(method("GET"))
            .and(path("/.api/deepsearch/v1/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .await
            .poll_until_complete(7, PollOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        let PollOutcome::Completed(conversation) = outcome else {
            panic!("expected a settled conversation");
        };
        let error = conversation.latest_question().unwrap().error.clone().unwrap();
        assert_eq!(error.kind, "TokenLimitExceeded");
    }

    #[tokio::test]
    async fn test_poll_cancelled() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = client(&server)
            .await
            .poll_until_complete(7, PollOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
    }
}
