//! Transports for the streaming search endpoint.
//!
//! A `Connector` opens one event stream per request. `HttpConnector` talks to
//! a real instance; `ScriptedConnector` replays canned events.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::config::StreamRequest;
use crate::error::Result;
use crate::event::RawEvent;

pub mod deep_search;
pub mod http;
pub mod scripted;

pub use deep_search::DeepSearchClient;
pub use http::HttpConnector;
pub use scripted::ScriptedConnector;

/// Stream of raw server-sent events for one session. Dropping it closes the
/// underlying connection.
pub type RawEventStream = Pin<Box<dyn Stream<Item = Result<RawEvent>> + Send>>;

/// Opens streaming search connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: &StreamRequest) -> Result<RawEventStream>;
}
