//! This module defines the command-line interface structure and handlers.

pub mod ask;
pub mod commands;
pub mod config_commands;
pub mod formatters;
pub mod interactive;
pub mod search;

// Re-export the main handler and the command enum
pub use commands::{handle_command, CliArgs, Commands};

// Re-export the Args structs for use in the main binary
pub use ask::AskArgs;
pub use config_commands::ConfigArgs;
pub use interactive::InteractiveArgs;
pub use search::SearchArgs;
