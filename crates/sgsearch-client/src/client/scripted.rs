//! Connector that serves canned event streams instead of talking HTTP.
//!
//! Each `connect` call consumes the next queued script. Used by tests and by
//! the CLI to replay saved event-stream transcripts.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{stream, Stream, StreamExt};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::{Connector, RawEventStream};
use crate::config::StreamRequest;
use crate::error::{Result, StreamError};
use crate::event::RawEvent;

/// Sender half of a live scripted connection.
pub type Feeder = UnboundedSender<Result<RawEvent>>;

enum Script {
    Events(Vec<Result<RawEvent>>),
    Channel(UnboundedReceiver<Result<RawEvent>>),
    Fail(StreamError),
}

#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<StreamRequest>>,
    drops: Option<Arc<AtomicUsize>>,
}

impl ScriptedConnector {
    /// A connector whose first connection yields `events` and then ends.
    pub fn new(events: Vec<RawEvent>) -> Self {
        let connector = Self::default();
        connector.push_events(events);
        connector
    }

    /// A connector whose first connection fails with `error`.
    pub fn failing(error: StreamError) -> Self {
        let connector = Self::default();
        connector.push_failure(error);
        connector
    }

    /// A connector whose first connection is fed live through the returned
    /// sender. Dropping the sender ends the stream.
    pub fn channel() -> (Self, Feeder) {
        let connector = Self::default();
        let feeder = connector.push_channel();
        (connector, feeder)
    }

    /// Parse a saved `text/event-stream` transcript into a one-connection
    /// script.
    pub async fn from_transcript(transcript: &str) -> Self {
        let body = transcript.to_string();
        let events: Vec<Result<RawEvent>> = stream::iter(vec![Ok::<String, Infallible>(body)])
            .eventsource()
            .map(|item| match item {
                Ok(event) => Ok(RawEvent::new(event.event, event.data)),
                Err(e) => Err(StreamError::Connection(e.to_string())),
            })
            .collect()
            .await;
        let connector = Self::default();
        connector.lock_scripts().push_back(Script::Events(events));
        connector
    }

    /// Count how many served streams get dropped.
    pub fn with_drop_counter(mut self, drops: Arc<AtomicUsize>) -> Self {
        self.drops = Some(drops);
        self
    }

    pub fn push_events(&self, events: Vec<RawEvent>) {
        self.lock_scripts()
            .push_back(Script::Events(events.into_iter().map(Ok).collect()));
    }

    pub fn push_failure(&self, error: StreamError) {
        self.lock_scripts().push_back(Script::Fail(error));
    }

    pub fn push_channel(&self) -> Feeder {
        let (tx, rx) = unbounded_channel();
        self.lock_scripts().push_back(Script::Channel(rx));
        tx
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn connection_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, VecDeque<Script>> {
        self.scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wrap<S>(&self, events: S) -> RawEventStream
    where
        S: Stream<Item = Result<RawEvent>> + Send + 'static,
    {
        let inner: RawEventStream = Box::pin(events);
        match &self.drops {
            Some(drops) => Box::pin(CountingStream {
                inner,
                drops: drops.clone(),
            }),
            None => inner,
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, request: &StreamRequest) -> Result<RawEventStream> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        let script = self.lock_scripts().pop_front();
        match script {
            Some(Script::Events(events)) => Ok(self.wrap(stream::iter(events))),
            Some(Script::Channel(rx)) => Ok(self.wrap(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
            Some(Script::Fail(error)) => Err(error),
            None => Err(StreamError::Connection(
                "no scripted response left".to_string(),
            )),
        }
    }
}

struct CountingStream {
    inner: RawEventStream,
    drops: Arc<AtomicUsize>,
}

impl Stream for CountingStream {
    type Item = Result<RawEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for CountingStream {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Instance;

    #[tokio::test]
    async fn test_scripts_are_served_in_order() {
        let connector = ScriptedConnector::new(vec![RawEvent::new("done", "")]);
        connector.push_failure(StreamError::Server("second".to_string()));
        let request = Instance::dotcom().request("foo");

        let mut first = connector.connect(&request).await.unwrap();
        assert_eq!(first.next().await, Some(Ok(RawEvent::new("done", ""))));
        assert_eq!(first.next().await, None);

        assert!(matches!(
            connector.connect(&request).await,
            Err(StreamError::Server(_))
        ));
        assert!(matches!(
            connector.connect(&request).await,
            Err(StreamError::Connection(_))
        ));
        assert_eq!(connector.connection_count(), 3);
    }

    #[tokio::test]
    async fn test_from_transcript() {
        let transcript = "event: matches\ndata: [{\"type\":\"repo\",\"repository\":\"a\"}]\n\nevent: done\ndata: {}\n\n";
        let connector = ScriptedConnector::from_transcript(transcript).await;
        let events: Vec<_> = connector
            .connect(&Instance::dotcom().request("a"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                Ok(RawEvent::new("matches", "[{\"type\":\"repo\",\"repository\":\"a\"}]")),
                Ok(RawEvent::new("done", "{}")),
            ]
        );
    }
}
