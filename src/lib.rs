//! `sgsearch-cli` is the command-line front end for the `sgsearch-client`
//! streaming search library.
//!
//! It provides:
//! - Configuration management (`config`)
//! - Logging setup (`logging`)
//! - The `sgsearch` command-line surface (`cli`)

/// Command definitions and handlers.
pub mod cli;
/// Configuration management for the application.
pub mod config;
/// Tracing subscriber setup.
pub mod logging;

pub use config::{load_config, save_config, AppConfig};
