//! # Observability
//!
//! Structured logging for keyward. Every log line carries the secret name
//! and backend kind as fields; secret values are never logged.

pub mod logging;

pub use logging::init_logging;
