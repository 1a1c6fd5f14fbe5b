//! Logging setup for shiftdiagctl
//!
//! Logs go to stderr so stdout stays clean for the summary (and for the JSON
//! a remote fetch parses). `RUST_LOG` wins over flags, flags over config.

use tracing_subscriber::EnvFilter;

/// Filter directive from config level and `-v`/`-q` counts
pub fn directive(config_level: &str, verbose: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => config_level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber; later calls are no-ops
pub fn init(config_level: &str, verbose: u8, quiet: bool) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(value) if !value.is_empty() => EnvFilter::new(value),
        _ => EnvFilter::try_new(directive(config_level, verbose, quiet))
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
