//! Secrets management over pluggable stores.
//!
//! This module provides one interface for sensitive configuration such as
//! API keys, token signing keys and database passwords, independent of
//! where each secret physically lives.
//!
//! # Architecture
//!
//! Every store implements the [`SecretBackend`] trait:
//! - **get**: Fetch a value, or `None` if absent
//! - **set**: Store or replace a value
//! - **delete**: Remove a value
//! - **list**: Metadata for every secret (never values)
//! - **rotate**: Replace the value of an existing secret
//!
//! Downstream code talks only to [`SecretsManager`], which resolves names
//! against a primary and fallback backend, records an audit trail, and
//! reports per-backend health.
//!
//! # Supported Backends
//!
//! - **Mounted**: One file per secret in an orchestrator-managed directory
//! - **HashiCorp Vault**: KV v2 engine
//! - **Environment**: Process environment plus a `.env` cache (development only)
//!
//! # Example
//!
//! ```rust,ignore
//! use keyward::config::Settings;
//! use keyward::secrets::{ensure_secret, SecretsManager, JWT_SECRET};
//!
//! let settings = Settings::load(None)?;
//! let manager = SecretsManager::from_settings(&settings.secrets);
//!
//! let jwt = ensure_secret(&manager, JWT_SECRET).await;
//! let health = manager.health_check().await;
//! ```
//!
//! # Security
//!
//! - Values are wrapped in [`SecretString`], which is zeroized on drop and
//!   redacted from `Debug`, `Display` and serialization
//! - Log lines carry secret names and backend kinds, never values
//! - The audit log records operations, never values

pub mod audit;
pub mod backend;
pub mod catalog;
pub mod env;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod mounted;
pub mod types;
pub mod vault;

pub use audit::{AuditEntry, AuditLog, AuditOperation, DEFAULT_AUDIT_CAPACITY};
pub use backend::{BackendKind, SecretBackend};
pub use catalog::{
    ensure_secret, generate_secret_value, provision_api_keys, CatalogEntry, API_KEYS,
    DATABASE_PASSWORD, ENCRYPTION_KEY, JWT_SECRET, REDIS_PASSWORD,
};
pub use env::EnvironmentBackend;
pub use error::{Result, SecretsError};
pub use manager::{ResolutionPolicy, SecretsManager};
pub use metadata::SecretMetadata;
pub use mounted::{MountedConfig, MountedSecretsBackend};
pub use types::SecretString;
pub use vault::{VaultBackend, VaultConfig};
