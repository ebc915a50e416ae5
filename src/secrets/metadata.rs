//! Secret lifecycle metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backend::BackendKind;

/// Metadata about a stored secret. Never carries the value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecretMetadata {
    /// Secret name within the backend's namespace
    pub name: String,

    /// When the secret was first written
    pub created_at: DateTime<Utc>,

    /// Last successful read, as far as the backend can tell
    pub last_accessed: DateTime<Utc>,

    /// Optional expiry hint for rotation tooling
    pub expires_at: Option<DateTime<Utc>>,

    /// Set when the secret is flagged for rotation
    pub rotation_needed: bool,

    /// Backend that last wrote the value
    pub source: BackendKind,
}

impl SecretMetadata {
    /// Fresh metadata for a secret written now.
    pub fn new(name: impl Into<String>, source: BackendKind) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            created_at: now,
            last_accessed: now,
            expires_at: None,
            rotation_needed: false,
            source,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_rotation_needed(mut self, rotation_needed: bool) -> Self {
        self.rotation_needed = rotation_needed;
        self
    }

    /// Whether the secret is past its expiry hint.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= Utc::now())
    }
}
