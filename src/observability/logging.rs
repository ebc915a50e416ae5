//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. Log lines go to stderr so that
//! command output on stdout stays machine-readable.
//!
//! Filter precedence: `RUST_LOG`, then `--verbose` (debug), then the
//! configured level.

use tracing::subscriber::set_global_default;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::LoggingSettings;

/// Directive used when the configured level does not parse.
const FALLBACK_DIRECTIVE: &str = "info";

/// Install the global subscriber. Returns `false` if one was already set,
/// in which case the existing subscriber is kept.
pub fn init_logging(settings: &LoggingSettings, verbose: bool) -> bool {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = filter_directives(settings, verbose, rust_log.as_deref());
    let filter =
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE));

    let builder = FmtSubscriber::builder().with_env_filter(filter).with_writer(std::io::stderr);

    let installed = if settings.json {
        set_global_default(builder.json().finish()).is_ok()
    } else {
        set_global_default(builder.finish()).is_ok()
    };

    if installed {
        tracing::debug!(filter = %directives, json = settings.json, "Logging initialized");
    }
    installed
}

fn filter_directives(settings: &LoggingSettings, verbose: bool, rust_log: Option<&str>) -> String {
    match rust_log.map(str::trim).filter(|directives| !directives.is_empty()) {
        Some(directives) => directives.to_string(),
        None if verbose => "debug".to_string(),
        None => settings.level.clone(),
    }
}
