//! Orchestrator-mounted secrets backend.
//!
//! Container orchestrators expose secrets as one file per secret under a
//! fixed directory (`/run/secrets` by default). This backend reads and
//! writes that layout, namespaced by a configurable filename prefix:
//!
//! ```text
//! /run/secrets/keyward_JWT_SECRET          <- raw value bytes, no framing
//! /run/secrets/.labels/keyward_JWT_SECRET.json
//! ```
//!
//! The `.labels` sidecar carries the creation timestamp and rotation hints
//! that the orchestrator would otherwise keep as object labels.
//!
//! # Limitations
//!
//! Mounted secrets are treated as immutable once created, so `set()` removes
//! the existing object and then creates a new one. The two steps are not
//! atomic: a caller cancelled between them leaves the secret absent until the
//! next successful `set()`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::backend::{BackendKind, SecretBackend};
use super::error::{Result, SecretsError};
use super::metadata::SecretMetadata;
use super::types::SecretString;

const LABEL_DIR: &str = ".labels";
const MANAGED_BY: &str = "keyward";

fn default_mount_dir() -> PathBuf {
    PathBuf::from("/run/secrets")
}

fn default_prefix() -> String {
    "keyward_".to_string()
}

/// Configuration for the mounted secrets backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MountedConfig {
    /// Register the backend at startup
    #[serde(default)]
    pub enabled: bool,

    /// Directory the orchestrator mounts secrets into
    #[serde(default = "default_mount_dir")]
    pub dir: PathBuf,

    /// Filename prefix namespacing this application's secrets
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for MountedConfig {
    fn default() -> Self {
        Self { enabled: false, dir: default_mount_dir(), prefix: default_prefix() }
    }
}

/// Creation label stored alongside each secret file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecretLabel {
    created_at: DateTime<Utc>,
    managed_by: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    rotation_needed: bool,
}

/// Secrets backend over an orchestrator-mounted directory.
#[derive(Debug, Clone)]
pub struct MountedSecretsBackend {
    dir: PathBuf,
    prefix: String,
}

impl MountedSecretsBackend {
    pub fn new(config: &MountedConfig) -> Self {
        info!(dir = %config.dir.display(), prefix = %config.prefix, "Initialized mounted secrets backend");
        Self { dir: config.dir.clone(), prefix: config.prefix.clone() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_name(&self, name: &str) -> Result<String> {
        validate_secret_name(name)?;
        Ok(format!("{}{}", self.prefix, name))
    }

    fn label_path(&self, object_name: &str) -> PathBuf {
        self.dir.join(LABEL_DIR).join(format!("{}.json", object_name))
    }

    fn io_failure(&self, operation: &str, name: &str, e: std::io::Error) -> SecretsError {
        error!(
            error = %e,
            secret = %name,
            dir = %self.dir.display(),
            operation = %operation,
            "Mounted secret operation failed"
        );
        SecretsError::backend_error(format!(
            "Failed to {} mounted secret '{}': {}",
            operation, name, e
        ))
    }

    /// Remove the object and its label. Returns whether the object existed.
    async fn remove_object(&self, name: &str, object_name: &str) -> Result<bool> {
        let existed = match fs::remove_file(self.dir.join(object_name)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(self.io_failure("remove", name, e)),
        };

        if let Err(e) = fs::remove_file(self.label_path(object_name)).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(error = %e, secret = %name, "Failed to remove mounted secret label");
            }
        }

        Ok(existed)
    }

    async fn create_object(&self, name: &str, object_name: &str, value: &SecretString) -> Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(self.dir.join(object_name))
            .await
            .map_err(|e| self.io_failure("create", name, e))?;
        file.write_all(value.expose_secret().as_bytes())
            .await
            .map_err(|e| self.io_failure("write", name, e))?;
        file.sync_all().await.map_err(|e| self.io_failure("sync", name, e))
    }

    /// Labels are auxiliary: failing to write one does not fail the `set()`.
    async fn write_label(&self, name: &str, object_name: &str, label: &SecretLabel) {
        let write = async {
            fs::create_dir_all(self.dir.join(LABEL_DIR)).await?;
            let json = serde_json::to_vec(label).map_err(std::io::Error::other)?;
            fs::write(self.label_path(object_name), json).await
        };

        if let Err(e) = write.await {
            warn!(error = %e, secret = %name, "Failed to write mounted secret label");
        }
    }

    async fn read_label(&self, object_name: &str) -> Option<SecretLabel> {
        let bytes = fs::read(self.label_path(object_name)).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(label) => Some(label),
            Err(e) => {
                warn!(error = %e, object = %object_name, "Ignoring unreadable mounted secret label");
                None
            }
        }
    }
}

/// Creation time reported by the filesystem, falling back to mtime.
fn platform_created(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    meta.created().or_else(|_| meta.modified()).ok().map(DateTime::<Utc>::from)
}

/// Reject names that would escape the mount directory.
fn validate_secret_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SecretsError::invalid_key(name, "name cannot be empty"));
    }

    if name.contains(['/', '\\', '\0']) {
        return Err(SecretsError::invalid_key(name, "name cannot contain path separators"));
    }

    if name.contains("..") {
        return Err(SecretsError::invalid_key(name, "name cannot contain '..'"));
    }

    Ok(())
}

#[async_trait]
impl SecretBackend for MountedSecretsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mounted
    }

    async fn get(&self, name: &str) -> Result<Option<SecretString>> {
        let object_name = self.object_name(name)?;

        let bytes = match fs::read(self.dir.join(&object_name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_failure("read", name, e)),
        };

        let value = String::from_utf8(bytes).map_err(|_| {
            error!(secret = %name, "Mounted secret is not valid UTF-8");
            SecretsError::backend_error(format!("Mounted secret '{}' is not valid UTF-8", name))
        })?;

        debug!(secret = %name, "Read mounted secret");
        Ok(Some(SecretString::new(value.trim_end())))
    }

    async fn set(
        &self,
        name: &str,
        value: &SecretString,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        let object_name = self.object_name(name)?;

        self.remove_object(name, &object_name).await?;
        self.create_object(name, &object_name, value).await?;

        let label = SecretLabel {
            created_at: Utc::now(),
            managed_by: MANAGED_BY.to_string(),
            expires_at: metadata.and_then(|m| m.expires_at),
            rotation_needed: metadata.is_some_and(|m| m.rotation_needed),
        };
        self.write_label(name, &object_name, &label).await;

        info!(secret = %name, object = %object_name, "Created mounted secret");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let object_name = self.object_name(name)?;
        let existed = self.remove_object(name, &object_name).await?;

        if existed {
            info!(secret = %name, object = %object_name, "Deleted mounted secret");
        }
        Ok(existed)
    }

    async fn list(&self) -> Result<BTreeMap<String, SecretMetadata>> {
        let mut entries =
            fs::read_dir(&self.dir).await.map_err(|e| self.io_failure("list", "*", e))?;

        let mut secrets = BTreeMap::new();
        while let Some(entry) =
            entries.next_entry().await.map_err(|e| self.io_failure("list", "*", e))?
        {
            let file_name = entry.file_name();
            let Some(object_name) = file_name.to_str() else {
                continue;
            };
            let Some(name) = object_name.strip_prefix(&self.prefix) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }

            // Follow symlinks: orchestrators commonly mount secrets that way.
            let file_meta = match fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, object = %object_name, "Failed to stat mounted secret");
                    continue;
                }
            };

            let label = self.read_label(object_name).await;
            let created_at = label
                .as_ref()
                .map(|l| l.created_at)
                .or_else(|| platform_created(&file_meta))
                .unwrap_or_else(Utc::now);
            let last_accessed =
                file_meta.accessed().ok().map(DateTime::<Utc>::from).unwrap_or(created_at);

            secrets.insert(
                name.to_string(),
                SecretMetadata {
                    name: name.to_string(),
                    created_at,
                    last_accessed,
                    expires_at: label.as_ref().and_then(|l| l.expires_at),
                    rotation_needed: label.as_ref().is_some_and(|l| l.rotation_needed),
                    source: BackendKind::Mounted,
                },
            );
        }

        Ok(secrets)
    }

    /// Recreates the object with the new value. The label keeps its
    /// `created_at` and expiry; the rotation flag is cleared.
    async fn rotate(&self, name: &str, new_value: &SecretString) -> Result<()> {
        let object_name = self.object_name(name)?;

        let file_meta = match fs::metadata(self.dir.join(&object_name)).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SecretsError::not_found(name));
            }
            Err(e) => return Err(self.io_failure("rotate", name, e)),
        };

        let previous = self.read_label(&object_name).await;
        let created_at = previous
            .as_ref()
            .map(|l| l.created_at)
            .or_else(|| platform_created(&file_meta))
            .unwrap_or_else(Utc::now);

        self.remove_object(name, &object_name).await?;
        self.create_object(name, &object_name, new_value).await?;

        let label = SecretLabel {
            created_at,
            managed_by: MANAGED_BY.to_string(),
            expires_at: previous.and_then(|l| l.expires_at),
            rotation_needed: false,
        };
        self.write_label(name, &object_name, &label).await;

        info!(secret = %name, object = %object_name, "Rotated mounted secret");
        Ok(())
    }
}
