//! Secrets manager: backend registry, resolution policy and audit trail.
//!
//! The manager is the only entry point downstream code uses. It routes each
//! call to one backend (or all of them for listing and health), records
//! successful operations in the audit log, and turns every backend fault into
//! a logged `false`/`None` so callers never have to handle store errors.
//!
//! # Resolution
//!
//! When a call names a backend, only that backend is used. Otherwise reads
//! try the primary and then the fallback, first hit wins; mutations go to
//! the primary.
//!
//! # Example
//!
//! ```rust,ignore
//! use keyward::config::Settings;
//! use keyward::secrets::SecretsManager;
//!
//! let settings = Settings::load(None)?;
//! let manager = SecretsManager::from_settings(&settings.secrets);
//!
//! manager.set_secret("JWT_SECRET", &"s3cr3t".into(), None).await;
//! let jwt = manager.get_secret("JWT_SECRET", None).await;
//! ```

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::audit::{AuditEntry, AuditLog, AuditOperation};
use super::backend::{BackendKind, SecretBackend};
use super::env::EnvironmentBackend;
use super::metadata::SecretMetadata;
use super::mounted::MountedSecretsBackend;
use super::types::SecretString;
use super::vault::VaultBackend;
use crate::config::SecretsSettings;

/// Order in which backends are consulted when a call names none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    pub primary: BackendKind,
    pub fallback: Option<BackendKind>,
}

impl ResolutionPolicy {
    /// A fallback equal to the primary is dropped.
    pub fn new(primary: BackendKind, fallback: Option<BackendKind>) -> Self {
        Self { primary, fallback: fallback.filter(|kind| *kind != primary) }
    }

    /// Backends to try for a read, in order.
    pub fn read_order(&self) -> Vec<BackendKind> {
        std::iter::once(self.primary).chain(self.fallback).collect()
    }
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self::new(BackendKind::Environment, None)
    }
}

/// Registry of secret backends with fallback resolution and auditing.
///
/// Backends are shared as `Arc<dyn SecretBackend>`; the manager holds no
/// lock across backend calls, so it can be used from many tasks at once.
#[derive(Debug)]
pub struct SecretsManager {
    backends: HashMap<BackendKind, Arc<dyn SecretBackend>>,
    policy: ResolutionPolicy,
    audit: AuditLog,
}

impl SecretsManager {
    /// Empty manager; backends are added with [`register`](Self::register).
    pub fn new(policy: ResolutionPolicy, audit_capacity: usize) -> Self {
        Self { backends: HashMap::new(), policy, audit: AuditLog::new(audit_capacity) }
    }

    /// Build the manager described by `settings`.
    ///
    /// The environment backend is always registered. Mounted is registered
    /// when enabled and vault when configured; a vault backend that cannot
    /// be constructed is skipped with a warning.
    pub fn from_settings(settings: &SecretsSettings) -> Self {
        let mut backends: HashMap<BackendKind, Arc<dyn SecretBackend>> = HashMap::new();

        if settings.mounted.enabled {
            backends.insert(
                BackendKind::Mounted,
                Arc::new(MountedSecretsBackend::new(&settings.mounted)),
            );
        }

        if let Some(vault) = &settings.vault {
            match VaultBackend::new(vault.clone()) {
                Ok(backend) => {
                    backends.insert(BackendKind::Vault, Arc::new(backend));
                }
                Err(e) => {
                    warn!(error = %e, "Vault backend unavailable, continuing without it");
                }
            }
        }

        backends.insert(
            BackendKind::Environment,
            Arc::new(EnvironmentBackend::new(settings.environment.env_file.clone())),
        );

        let primary = settings.primary.unwrap_or_else(|| detect_primary(&backends));
        if !backends.contains_key(&primary) {
            warn!(backend = %primary, "Primary secret backend is not registered");
        }

        let manager = Self {
            backends,
            policy: ResolutionPolicy::new(primary, settings.fallback),
            audit: AuditLog::new(settings.audit_capacity),
        };

        info!(
            primary = %manager.policy.primary,
            fallback = ?manager.policy.fallback,
            backends = ?manager.registered_backends(),
            "Initialized secrets manager"
        );

        manager
    }

    /// Add a backend under its own kind, replacing any previous one.
    pub fn register(&mut self, backend: Arc<dyn SecretBackend>) -> Option<Arc<dyn SecretBackend>> {
        let kind = backend.kind();
        debug!(backend = %kind, "Registering secret backend");
        self.backends.insert(kind, backend)
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Registered backend kinds, sorted.
    pub fn registered_backends(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<BackendKind> = self.backends.keys().copied().collect();
        kinds.sort();
        kinds
    }

    fn lookup(&self, kind: BackendKind) -> Option<&Arc<dyn SecretBackend>> {
        let backend = self.backends.get(&kind);
        if backend.is_none() {
            warn!(backend = %kind, "Secret backend not registered, skipping");
        }
        backend
    }

    /// Resolve the backend a mutation goes to.
    fn target(&self, backend: Option<BackendKind>) -> Option<(BackendKind, &Arc<dyn SecretBackend>)> {
        let kind = backend.unwrap_or(self.policy.primary);
        match self.backends.get(&kind) {
            Some(store) => Some((kind, store)),
            None => {
                error!(backend = %kind, "Secret backend not registered");
                None
            }
        }
    }

    /// Fetch a secret.
    ///
    /// With `backend` set, only that backend is asked. Otherwise the primary
    /// and then the fallback are tried; a failing backend is logged and the
    /// next one is tried.
    pub async fn get_secret(&self, name: &str, backend: Option<BackendKind>) -> Option<SecretString> {
        let candidates = match backend {
            Some(kind) => vec![kind],
            None => self.policy.read_order(),
        };

        for kind in candidates {
            let Some(store) = self.lookup(kind) else {
                continue;
            };

            match store.get(name).await {
                Ok(Some(value)) => {
                    debug!(secret = %name, backend = %kind, "Secret resolved");
                    self.audit.record(name, kind, AuditOperation::Read);
                    return Some(value);
                }
                Ok(None) => {
                    debug!(secret = %name, backend = %kind, "Secret not present in backend");
                }
                Err(e) => {
                    error!(error = %e, secret = %name, backend = %kind, "Secret backend read failed");
                }
            }
        }

        warn!(secret = %name, "Secret not found in any backend");
        None
    }

    /// Whether `name` resolves, without handing out the value.
    ///
    /// A hit is audited as a read.
    pub async fn secret_exists(&self, name: &str, backend: Option<BackendKind>) -> bool {
        self.get_secret(name, backend).await.is_some()
    }

    /// Store a secret in `backend`, or the primary.
    pub async fn set_secret(
        &self,
        name: &str,
        value: &SecretString,
        backend: Option<BackendKind>,
    ) -> bool {
        let Some((kind, store)) = self.target(backend) else {
            return false;
        };

        let metadata = SecretMetadata::new(name, kind);
        match store.set(name, value, Some(&metadata)).await {
            Ok(()) => {
                info!(secret = %name, backend = %kind, "Secret stored");
                self.audit.record(name, kind, AuditOperation::Write);
                true
            }
            Err(e) => {
                error!(error = %e, secret = %name, backend = %kind, "Failed to store secret");
                false
            }
        }
    }

    /// Delete a secret. Returns `false` if it was not there.
    pub async fn delete_secret(&self, name: &str, backend: Option<BackendKind>) -> bool {
        let Some((kind, store)) = self.target(backend) else {
            return false;
        };

        match store.delete(name).await {
            Ok(true) => {
                info!(secret = %name, backend = %kind, "Secret deleted");
                self.audit.record(name, kind, AuditOperation::Delete);
                true
            }
            Ok(false) => {
                warn!(secret = %name, backend = %kind, "Secret to delete does not exist");
                false
            }
            Err(e) => {
                error!(error = %e, secret = %name, backend = %kind, "Failed to delete secret");
                false
            }
        }
    }

    /// Replace the value of an existing secret. Absent secrets are not created.
    pub async fn rotate_secret(
        &self,
        name: &str,
        new_value: &SecretString,
        backend: Option<BackendKind>,
    ) -> bool {
        let Some((kind, store)) = self.target(backend) else {
            return false;
        };

        match store.rotate(name, new_value).await {
            Ok(()) => {
                info!(secret = %name, backend = %kind, "Secret rotated");
                self.audit.record(name, kind, AuditOperation::Rotate);
                true
            }
            Err(e) if e.is_not_found() => {
                warn!(secret = %name, backend = %kind, "Cannot rotate a secret that does not exist");
                false
            }
            Err(e) => {
                error!(error = %e, secret = %name, backend = %kind, "Failed to rotate secret");
                false
            }
        }
    }

    /// Metadata from every backend, queried concurrently.
    ///
    /// A backend that fails to list contributes an empty map.
    pub async fn list_all_secrets(&self) -> BTreeMap<BackendKind, BTreeMap<String, SecretMetadata>> {
        let listings = self.backends.iter().map(|(kind, store)| async move {
            let secrets = match store.list().await {
                Ok(secrets) => secrets,
                Err(e) => {
                    error!(error = %e, backend = %kind, "Failed to list secrets");
                    BTreeMap::new()
                }
            };
            (*kind, secrets)
        });

        join_all(listings).await.into_iter().collect()
    }

    /// Probe every backend concurrently with a `list` call.
    pub async fn health_check(&self) -> BTreeMap<BackendKind, bool> {
        let probes = self.backends.iter().map(|(kind, store)| async move {
            let healthy = match store.list().await {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, backend = %kind, "Secret backend health check failed");
                    false
                }
            };
            (*kind, healthy)
        });

        join_all(probes).await.into_iter().collect()
    }

    /// Copy of the audit log, oldest first.
    pub fn get_audit_log(&self) -> Vec<AuditEntry> {
        self.audit.snapshot()
    }

    /// Release every backend.
    pub fn shutdown(self) {
        info!(backends = self.backends.len(), "Shutting down secrets manager");
    }
}

/// Mounted if registered, else vault if registered, else environment.
fn detect_primary(backends: &HashMap<BackendKind, Arc<dyn SecretBackend>>) -> BackendKind {
    [BackendKind::Mounted, BackendKind::Vault]
        .into_iter()
        .find(|kind| backends.contains_key(kind))
        .unwrap_or(BackendKind::Environment)
}
