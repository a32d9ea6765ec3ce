use thiserror::Error;

/// Errors that terminate a stream session or a collaborator request.
///
/// Decode and transport failures are the only failure outcomes of a session.
/// Caller cancellation is not an error and never shows up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Malformed '{event}' event: {message}")]
    Decode { event: String, message: String },

    #[error("Search request failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Stream closed before the server sent 'done'")]
    ClosedWithoutDone,

    #[error("Server returned error: {0}")]
    Server(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Gave up polling after {attempts} attempts")]
    PollExhausted { attempts: u32 },
}

/// Client-specific result type
pub type Result<T> = std::result::Result<T, StreamError>;

impl StreamError {
    /// True for malformed event payloads.
    pub fn is_decode(&self) -> bool {
        matches!(self, StreamError::Decode { .. })
    }

    /// True for connection-level failures, non-2xx responses, premature
    /// closes and errors reported by the server.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StreamError::Http { .. }
                | StreamError::Connection(_)
                | StreamError::ClosedWithoutDone
                | StreamError::Server(_)
        )
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return StreamError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        StreamError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode {
            event: "response".to_string(),
            message: err.to_string(),
        }
    }
}
