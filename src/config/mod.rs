//! # Configuration Management
//!
//! Layered settings for keyward: defaults, an optional TOML file, then
//! `KEYWARD__*` environment variables. See [`settings`] for the structure.

pub mod settings;

pub use settings::{EnvironmentSettings, LoggingSettings, SecretsSettings, Settings};
