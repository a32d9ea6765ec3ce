//! HTTP(S) connector for `GET <instance>/search/stream`.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use tracing::{debug, error};

use super::{Connector, RawEventStream};
use crate::config::{Instance, StreamRequest};
use crate::error::{Result, StreamError};
use crate::event::RawEvent;

pub struct HttpConnector {
    instance: Instance,
    http_client: Client,
}

impl HttpConnector {
    /// Create a connector for `instance`, honouring its proxy setting.
    pub fn new(instance: Instance) -> Result<Self> {
        let http_client = instance.http_client()?;
        Ok(Self {
            instance,
            http_client,
        })
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, request: &StreamRequest) -> Result<RawEventStream> {
        let url = self.instance.stream_url(request)?;
        debug!("Connecting to {}", url);

        let mut req_builder = self
            .http_client
            .get(url)
            .header(ACCEPT, "text/event-stream");
        if let Some(auth) = self.instance.authorization_header() {
            req_builder = req_builder.header(AUTHORIZATION, auth);
        }

        let response = req_builder.send().await.map_err(|e| {
            error!("Failed to send search request: {}", e);
            StreamError::Connection(e.to_string())
        })?;

        let status = response.status();
        debug!("Search stream responded with HTTP {}", status);
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StreamError::Http {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let events = response.bytes_stream().eventsource().map(|item| match item {
            Ok(event) => Ok(RawEvent {
                name: event.event,
                data: event.data,
            }),
            Err(e) => Err(StreamError::Connection(e.to_string())),
        });
        Ok(Box::pin(events))
    }
}
