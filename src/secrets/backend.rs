//! Secret backend trait and types
//!
//! Defines the uniform operation set every secret store integration implements.

use super::error::{Result, SecretsError};
use super::metadata::SecretMetadata;
use super::types::SecretString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Type of secret backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Orchestrator-mounted secret files
    Mounted,
    /// Vault KV v2
    Vault,
    /// Process environment plus dotfile cache (development only)
    Environment,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Mounted, Self::Vault, Self::Environment];

    /// Get the wire/config representation of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mounted => "mounted",
            Self::Vault => "vault",
            Self::Environment => "environment",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mounted" => Ok(Self::Mounted),
            "vault" => Ok(Self::Vault),
            "environment" => Ok(Self::Environment),
            _ => Err(format!("Unknown secret backend: {}", s)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for secret backends
///
/// Implementations must be Send + Sync; the manager shares them across tasks
/// behind an `Arc` and never serializes calls.
///
/// Every store-local fault is converted to a [`SecretsError`] (and logged)
/// inside the implementation. A missing secret is `Ok(None)` from `get` and
/// `Ok(false)` from `delete`, not an error.
#[async_trait]
pub trait SecretBackend: Send + Sync + fmt::Debug {
    /// Get the backend kind identifier
    fn kind(&self) -> BackendKind;

    /// Fetch the exact stored value, or `None` if the name is absent
    async fn get(&self, name: &str) -> Result<Option<SecretString>>;

    /// Store a value, replacing any previous one
    async fn set(
        &self,
        name: &str,
        value: &SecretString,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()>;

    /// Remove a secret. Returns `false` if nothing was stored under `name`.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// List metadata for every secret in this backend's namespace
    async fn list(&self) -> Result<BTreeMap<String, SecretMetadata>>;

    /// Replace the value of an existing secret
    ///
    /// Rotating a secret that does not exist fails with
    /// [`SecretsError::NotFound`]; rotation never creates.
    async fn rotate(&self, name: &str, new_value: &SecretString) -> Result<()> {
        if self.get(name).await?.is_none() {
            return Err(SecretsError::not_found(name));
        }
        self.set(name, new_value, None).await
    }
}
