//! Logging utilities
//!
//! Provides logging setup for the client binary.

use env_logger::Env;

/// Setup logging; `RUST_LOG` wins over `default_level` when set
pub fn setup_logging(default_level: &str) {
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

/// Log level for a `-v` count
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
