//! # sgsearch-client
//!
//! Client library for the Sourcegraph streaming search API.
//!
//! A search is a server-sent event stream carrying `matches`, `filters`,
//! `alert`, `progress`, `done` and `error` events. This crate decodes those
//! events, drives one stream per query through a [`StreamSession`], and keeps a
//! consistent [`SearchSnapshot`] across rapidly superseded queries with the
//! [`SearchCoordinator`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sgsearch_client::{HttpConnector, Instance, SearchCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let instance = Instance::dotcom().with_default_context("global");
//!     let connector = Arc::new(HttpConnector::new(instance.clone())?);
//!     let mut coordinator = SearchCoordinator::new(instance, connector);
//!
//!     coordinator.search("lang:rust tokio::select!");
//!     let snapshot = coordinator.wait_until_idle().await;
//!     for result in &snapshot.results {
//!         println!("{}", result.url);
//!     }
//!     println!("{}", snapshot.summary);
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod collect;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod links;
pub mod matches;
pub mod session;
pub mod summary;

pub use client::{Connector, DeepSearchClient, HttpConnector, RawEventStream, ScriptedConnector};
pub use collect::{collect_kind, collect_matches, SearchKind, DEFAULT_COLLECT_TIMEOUT};
pub use config::{Instance, PatternType, StreamRequest, TokenKind, DOTCOM_URL};
pub use coordinator::{augment_query, SearchCoordinator, SearchSnapshot};
pub use error::{Result, StreamError};
pub use event::{decode, RawEvent, SearchEvent};
pub use matches::{url_for, SearchMatch, SearchResult};
pub use session::{
    Alert, Progress, SearchHandler, SessionOutcome, SessionState, StreamSession, Suggestion,
    SuggestionPlacement,
};
pub use summary::{summarize_match, summarize_matches};
