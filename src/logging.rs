//! Tracing setup for the binary. Logs go to stderr so stdout stays clean for
//! results and JSON output.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Filter directive for the given number of `-v` flags.
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` wins when no `-v` flag is given.
pub fn init_logging(verbose: u8) -> Result<()> {
    let level = level_for_verbosity(verbose);
    let filter = if verbose > 0 {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
