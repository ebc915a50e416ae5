//! Environment secrets backend implementation.
//!
//! Reads secrets from the live process environment, falling back to an
//! in-memory cache seeded once from a local `KEY=VALUE` file. It is intended
//! for **development and testing only**.
//!
//! # Security Warning
//!
//! Nothing written through this backend is durable:
//! - `set()` and `delete()` only touch the in-memory cache
//! - The real process environment is never modified
//! - Every `set()` logs a warning saying so
//!
//! # File Format
//!
//! ```text
//! # comment lines and blank lines are ignored
//! JWT_SECRET=abc123
//! DATABASE_URL=postgres://user:pw@host/db?sslmode=require
//! ```
//!
//! The first `=` separates key from value; the value may contain further `=`.
//! Quotes and `$VAR` references are not interpreted, so the cached value is
//! exactly what the file holds.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::backend::{BackendKind, SecretBackend};
use super::error::{Result, SecretsError};
use super::metadata::SecretMetadata;
use super::types::SecretString;

/// Default dotfile consulted when no path is configured.
pub const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Debug, Clone)]
struct CachedSecret {
    value: SecretString,
    metadata: SecretMetadata,
}

impl CachedSecret {
    fn new(name: &str, value: SecretString) -> Self {
        Self { value, metadata: SecretMetadata::new(name, BackendKind::Environment) }
    }
}

/// Environment secrets backend (development only).
///
/// The live environment always wins over the cache, so a `set()` for a name
/// that is also exported in the process environment is shadowed on read.
#[derive(Debug, Default)]
pub struct EnvironmentBackend {
    env_file: Option<PathBuf>,
    cache: RwLock<HashMap<String, CachedSecret>>,
}

impl EnvironmentBackend {
    /// Creates the backend, loading `env_file` into the cache if it exists.
    ///
    /// A missing file is not an error; the cache simply starts empty.
    pub fn new(env_file: Option<PathBuf>) -> Self {
        let mut cache = HashMap::new();

        if let Some(path) = env_file.as_deref() {
            for (key, value) in load_env_file(path) {
                cache.insert(key.clone(), CachedSecret::new(&key, SecretString::new(value)));
            }
        }

        info!(
            env_file = ?env_file,
            cached = cache.len(),
            "Initialized environment secrets backend"
        );

        Self { env_file, cache: RwLock::new(cache) }
    }

    /// Path the cache was seeded from, if any.
    pub fn env_file(&self) -> Option<&Path> {
        self.env_file.as_deref()
    }

    fn live_value(name: &str) -> Option<SecretString> {
        std::env::var(name).ok().filter(|value| !value.is_empty()).map(SecretString::from)
    }
}

fn load_env_file(path: &Path) -> Vec<(String, String)> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_env_file(&contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No env file found, starting with empty cache");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to read env file");
            Vec::new()
        }
    }
}

/// Parse `KEY=VALUE` lines. Comment, blank and malformed lines are skipped.
pub(crate) fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                entries.push((key.trim().to_string(), value.to_string()));
            }
            _ => {
                // Only the line number is logged; the line may hold a value.
                warn!(line = index + 1, "Skipping malformed env file line");
            }
        }
    }

    entries
}

#[async_trait]
impl SecretBackend for EnvironmentBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Environment
    }

    async fn get(&self, name: &str) -> Result<Option<SecretString>> {
        if let Some(value) = Self::live_value(name) {
            return Ok(Some(value));
        }

        let mut cache = self.cache.write().await;
        Ok(cache.get_mut(name).map(|entry| {
            entry.metadata.last_accessed = Utc::now();
            entry.value.clone()
        }))
    }

    async fn set(
        &self,
        name: &str,
        value: &SecretString,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        warn!(
            secret = %name,
            "Storing secret in environment backend: in-memory only, unsafe for production use"
        );

        let mut cache = self.cache.write().await;
        let mut fresh = metadata
            .cloned()
            .unwrap_or_else(|| SecretMetadata::new(name, BackendKind::Environment));
        fresh.name = name.to_string();
        fresh.source = BackendKind::Environment;

        if let Some(existing) = cache.get(name) {
            fresh.created_at = existing.metadata.created_at;
        }

        cache.insert(name.to_string(), CachedSecret { value: value.clone(), metadata: fresh });
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.cache.write().await.remove(name).is_some())
    }

    async fn list(&self) -> Result<BTreeMap<String, SecretMetadata>> {
        let cache = self.cache.read().await;
        Ok(cache.iter().map(|(name, entry)| (name.clone(), entry.metadata.clone())).collect())
    }

    /// Only cached secrets can be rotated; values exported in the live
    /// environment are read-only from this backend's point of view.
    async fn rotate(&self, name: &str, new_value: &SecretString) -> Result<()> {
        let mut cache = self.cache.write().await;
        let entry = cache.get_mut(name).ok_or_else(|| SecretsError::not_found(name))?;

        warn!(
            secret = %name,
            "Rotating secret in environment backend: in-memory only, unsafe for production use"
        );

        entry.value = new_value.clone();
        entry.metadata.rotation_needed = false;
        entry.metadata.source = BackendKind::Environment;
        Ok(())
    }
}
