//! # Keyward
//!
//! Keyward gives an application one API for its secrets (API keys, database
//! and cache passwords, signing keys) without hardcoding where any of them
//! physically live.
//!
//! ## Architecture
//!
//! ```text
//! Callers / CLI → SecretsManager → Mounted files
//!                      ↓         → Vault KV v2
//!                  Audit log     → Environment + .env cache
//! ```
//!
//! ## Core Components
//!
//! - **Secret backends**: One trait, three stores, selected by configuration
//! - **Secrets manager**: Primary/fallback resolution, audit log, health
//! - **Catalog**: Well-known API keys, provisioning and generate-if-absent
//! - **Configuration**: Layered TOML file and `KEYWARD__*` environment
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use keyward::{config::Settings, secrets::SecretsManager, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = Settings::load(None)?;
//!     let manager = SecretsManager::from_settings(&settings.secrets);
//!
//!     if let Some(key) = manager.get_secret("OPENAI_API_KEY", None).await {
//!         println!("API key has {} characters", key.len());
//!     }
//!
//!     manager.shutdown();
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;

// Re-export commonly used types and traits
pub use config::Settings;
pub use errors::{Error, Result};
pub use observability::init_logging;
pub use secrets::{BackendKind, SecretBackend, SecretString, SecretsManager};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Serializes unit tests that read or modify process environment variables.
#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
