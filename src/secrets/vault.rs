//! HashiCorp Vault secrets backend implementation.
//!
//! Stores each secret as one document in a KV v2 engine:
//!
//! ```json
//! {
//!   "value": "<secret>",
//!   "created_at": "2025-01-01T00:00:00+00:00",
//!   "managed_by": "keyward",
//!   "metadata": { "expires_at": null, "rotation_needed": false }
//! }
//! ```
//!
//! # Connection
//!
//! The client is built lazily on first use. Building it verifies the token
//! with `auth/token/lookup-self` and enables the KV v2 engine at the
//! configured mount if it is not already mounted. If either step fails the
//! call fails and Vault is skipped for `retry_backoff_seconds`; the first call
//! after that tries again, so a Vault server that comes up after this process
//! does not need a restart.
//!
//! Every request is bounded by `timeout_seconds`.
//!
//! # Security
//!
//! - Tokens are never logged and are redacted from `Debug` and serialized
//!   configuration
//! - Secret values only leave this module inside a [`SecretString`]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};
use url::Url;
use validator::{Validate, ValidationError};
use vaultrs::api::sys::requests::EnableEngineRequest;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use super::backend::{BackendKind, SecretBackend};
use super::error::{Result, SecretsError};
use super::metadata::SecretMetadata;
use super::types::SecretString;

/// Value written to the `managed_by` field of every stored document.
pub const MANAGED_BY: &str = "keyward";

/// Configuration for the Vault backend.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VaultConfig {
    /// Vault server address (e.g., "https://vault.example.com:8200")
    #[validate(custom(function = "validate_vault_address"))]
    pub address: String,

    /// Authentication token. Falls back to `VAULT_TOKEN` when unset.
    #[serde(default)]
    pub token: Option<SecretString>,

    /// Vault namespace (for Enterprise multi-tenancy)
    #[serde(default)]
    pub namespace: Option<String>,

    /// KV v2 mount path
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Upper bound for any single Vault request
    #[serde(default = "default_timeout_seconds")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,

    /// How long to skip Vault after a failed connect. Zero retries on every call.
    #[serde(default = "default_retry_backoff_seconds")]
    #[validate(range(max = 3600))]
    pub retry_backoff_seconds: u64,
}

fn default_mount_path() -> String {
    "keyward".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_retry_backoff_seconds() -> u64 {
    5
}

/// Parse a Vault address. Only absolute `http`/`https` URLs with a host are
/// accepted; `vaultrs` panics on anything it cannot parse.
pub fn parse_vault_address(address: &str) -> std::result::Result<Url, String> {
    let url = Url::parse(address.trim())
        .map_err(|e| format!("Vault address is not a valid URL: {}", e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("Vault address must use http or https, not '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("Vault address has no host".to_string());
    }

    Ok(url)
}

fn validate_vault_address(address: &str) -> std::result::Result<(), ValidationError> {
    parse_vault_address(address).map(|_| ()).map_err(|reason| {
        let mut error = ValidationError::new("vault_address");
        error.message = Some(reason.into());
        error
    })
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            mount_path: default_mount_path(),
            timeout_seconds: default_timeout_seconds(),
            retry_backoff_seconds: default_retry_backoff_seconds(),
        }
    }
}

impl VaultConfig {
    /// Build a configuration from `VAULT_ADDR` and friends.
    ///
    /// Returns `None` when `VAULT_ADDR` is not set.
    ///
    /// # Environment Variables
    ///
    /// - `VAULT_ADDR`: Vault server address
    /// - `VAULT_TOKEN`: Authentication token
    /// - `VAULT_NAMESPACE`: Optional namespace
    /// - `VAULT_MOUNT_PATH`: Optional mount path (default: "keyward")
    pub fn from_env() -> Option<Self> {
        let address = std::env::var("VAULT_ADDR").ok().filter(|a| !a.is_empty())?;

        Some(Self {
            address,
            token: std::env::var("VAULT_TOKEN").ok().map(SecretString::from),
            namespace: std::env::var("VAULT_NAMESPACE").ok(),
            mount_path: std::env::var("VAULT_MOUNT_PATH").unwrap_or_else(|_| default_mount_path()),
            timeout_seconds: default_timeout_seconds(),
            retry_backoff_seconds: default_retry_backoff_seconds(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct RotationInfo {
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    rotation_needed: bool,
}

impl From<&SecretMetadata> for RotationInfo {
    fn from(metadata: &SecretMetadata) -> Self {
        Self {
            expires_at: metadata.expires_at.map(|at| at.to_rfc3339()),
            rotation_needed: metadata.rotation_needed,
        }
    }
}

/// Outgoing document. Holds a borrowed plaintext value only for the
/// duration of the write.
#[derive(Serialize)]
struct PayloadWrite<'a> {
    value: &'a str,
    created_at: String,
    managed_by: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rotated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<RotationInfo>,
}

/// Incoming document. Only `value` is required so that secrets written by
/// other tools can still be read.
#[derive(Deserialize)]
struct StoredPayload {
    value: SecretString,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    metadata: Option<RotationInfo>,
}

impl StoredPayload {
    fn to_metadata(&self, name: &str) -> SecretMetadata {
        let mut metadata = SecretMetadata::new(name, BackendKind::Vault);
        if let Some(created_at) = self.created_at.as_deref().and_then(parse_timestamp) {
            metadata.created_at = created_at;
        }
        if let Some(info) = &self.metadata {
            metadata.expires_at = info.expires_at.as_deref().and_then(parse_timestamp);
            metadata.rotation_needed = info.rotation_needed;
        }
        metadata
    }
}

/// Accepts RFC 3339 and naive ISO-8601 timestamps (read as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|dt| dt.and_utc())
        })
}

fn is_not_found(e: &ClientError) -> bool {
    matches!(e, ClientError::APIError { code: 404, .. })
}

/// HashiCorp Vault KV v2 backend.
///
/// # Thread Safety
///
/// The lazily built client is shared behind a [`OnceCell`]; concurrent
/// first calls build it once.
pub struct VaultBackend {
    config: VaultConfig,
    address: Url,
    client: OnceCell<VaultClient>,
    /// Set after a failed connect; calls before this instant fail fast.
    unavailable_until: Mutex<Option<Instant>>,
}

impl fmt::Debug for VaultBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultBackend")
            .field("address", &self.address.as_str())
            .field("mount_path", &self.config.mount_path)
            .field("connected", &self.client.initialized())
            .finish()
    }
}

impl VaultBackend {
    /// Creates the backend without contacting Vault.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::ConfigError`] if the address is not an http(s) URL
    ///   or the mount path is empty
    pub fn new(config: VaultConfig) -> Result<Self> {
        if config.address.trim().is_empty() {
            return Err(SecretsError::config_error("Vault address cannot be empty"));
        }
        let address = parse_vault_address(&config.address).map_err(SecretsError::config_error)?;
        if config.mount_path.trim().is_empty() {
            return Err(SecretsError::config_error("Vault mount path cannot be empty"));
        }

        info!(
            address = %address,
            mount_path = %config.mount_path,
            "Initialized Vault secrets backend"
        );

        Ok(Self { config, address, client: OnceCell::new(), unavailable_until: Mutex::new(None) })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    /// Run a Vault request under the configured timeout.
    async fn bounded<T, F>(
        &self,
        operation: &str,
        request: F,
    ) -> Result<std::result::Result<T, ClientError>>
    where
        F: Future<Output = std::result::Result<T, ClientError>>,
    {
        tokio::time::timeout(self.request_timeout(), request).await.map_err(|_| {
            error!(
                operation = %operation,
                address = %self.address,
                timeout_seconds = self.config.timeout_seconds,
                "Vault request timed out"
            );
            SecretsError::timeout(operation, self.config.timeout_seconds)
        })
    }

    fn request_failure(&self, operation: &str, name: &str, e: ClientError) -> SecretsError {
        error!(
            error = %e,
            secret = %name,
            operation = %operation,
            mount_path = %self.config.mount_path,
            "Vault request failed"
        );
        match e {
            ClientError::APIError { code: 401 | 403, .. } => {
                SecretsError::authentication_failed(format!("Vault denied {}: {}", operation, e))
            }
            other => SecretsError::backend_error(format!(
                "Vault {} of '{}' failed: {}",
                operation, name, other
            )),
        }
    }

    async fn client(&self) -> Result<&VaultClient> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }

        if let Some(remaining) = self.backoff_remaining() {
            debug!(
                address = %self.address,
                retry_in_ms = remaining.as_millis() as u64,
                "Vault unavailable, skipping connect"
            );
            return Err(SecretsError::connection_failed(format!(
                "Vault at {} is unavailable, next attempt in {}s",
                self.address,
                remaining.as_secs().max(1)
            )));
        }

        match self.client.get_or_try_init(|| self.connect()).await {
            Ok(client) => Ok(client),
            Err(e) => {
                self.mark_unavailable();
                Err(e)
            }
        }
    }

    fn backoff_remaining(&self) -> Option<Duration> {
        let until = (*self.unavailable_until.lock().unwrap_or_else(PoisonError::into_inner))?;
        until.checked_duration_since(Instant::now()).filter(|remaining| !remaining.is_zero())
    }

    fn mark_unavailable(&self) {
        let backoff = Duration::from_secs(self.config.retry_backoff_seconds);
        if backoff.is_zero() {
            return;
        }
        *self.unavailable_until.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Instant::now() + backoff);
    }

    async fn connect(&self) -> Result<VaultClient> {
        let token = self
            .config
            .token
            .clone()
            .or_else(|| std::env::var("VAULT_TOKEN").ok().map(SecretString::from))
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                error!(address = %self.address, "No Vault token configured");
                SecretsError::authentication_failed("No Vault token configured")
            })?;

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(self.address.as_str());
        settings_builder.token(token.expose_secret());

        if let Some(namespace) = &self.config.namespace {
            settings_builder.namespace(Some(namespace.clone()));
        }

        let settings = settings_builder.build().map_err(|e| {
            SecretsError::config_error(format!("Invalid Vault configuration: {}", e))
        })?;

        let client = VaultClient::new(settings).map_err(|e| {
            SecretsError::connection_failed(format!("Failed to create Vault client: {}", e))
        })?;

        match self.bounded("token lookup", vaultrs::token::lookup_self(&client)).await? {
            Ok(_) => {}
            Err(e @ ClientError::APIError { .. }) => {
                error!(error = %e, address = %self.address, "Vault rejected token");
                return Err(SecretsError::authentication_failed(format!(
                    "Vault token lookup failed: {}",
                    e
                )));
            }
            Err(e) => {
                error!(error = %e, address = %self.address, "Failed to reach Vault");
                return Err(SecretsError::connection_failed(format!(
                    "Vault is unreachable: {}",
                    e
                )));
            }
        }

        self.ensure_kv_engine(&client).await;

        info!(address = %self.address, "Successfully connected to Vault");
        Ok(client)
    }

    /// Mount a KV v2 engine at the configured path. Already mounted is fine.
    async fn ensure_kv_engine(&self, client: &VaultClient) {
        let mut request = EnableEngineRequest::builder();
        request.options(HashMap::from([("version".to_string(), "2".to_string())]));

        let enable = vaultrs::sys::mount::enable(
            client,
            &self.config.mount_path,
            "kv",
            Some(&mut request),
        );

        match self.bounded("enable kv engine", enable).await {
            Ok(Ok(())) => {
                info!(mount_path = %self.config.mount_path, "Enabled KV v2 secrets engine");
            }
            Ok(Err(ClientError::APIError { code: 400, .. })) => {
                debug!(mount_path = %self.config.mount_path, "KV secrets engine already mounted");
            }
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    mount_path = %self.config.mount_path,
                    "Could not enable KV secrets engine, assuming it is managed externally"
                );
            }
            Err(_) => {}
        }
    }

    async fn read_payload(&self, name: &str) -> Result<Option<StoredPayload>> {
        let client = self.client().await?;
        let read: std::result::Result<StoredPayload, ClientError> =
            self.bounded("read", kv2::read(client, &self.config.mount_path, name)).await?;

        match read {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(self.request_failure("read", name, e)),
        }
    }

    async fn write_payload(&self, name: &str, payload: &PayloadWrite<'_>) -> Result<()> {
        let client = self.client().await?;
        self.bounded("write", kv2::set(client, &self.config.mount_path, name, payload))
            .await?
            .map_err(|e| self.request_failure("write", name, e))?;
        Ok(())
    }
}

#[async_trait]
impl SecretBackend for VaultBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vault
    }

    async fn get(&self, name: &str) -> Result<Option<SecretString>> {
        Ok(self.read_payload(name).await?.map(|payload| payload.value))
    }

    async fn set(
        &self,
        name: &str,
        value: &SecretString,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        let payload = PayloadWrite {
            value: value.expose_secret(),
            created_at: Utc::now().to_rfc3339(),
            managed_by: MANAGED_BY,
            rotated_at: None,
            metadata: Some(metadata.map(RotationInfo::from).unwrap_or_default()),
        };

        self.write_payload(name, &payload).await?;

        info!(secret = %name, mount_path = %self.config.mount_path, "Stored secret in Vault");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let client = self.client().await?;

        let existing =
            self.bounded("read metadata", kv2::read_metadata(client, &self.config.mount_path, name))
                .await?;
        match existing {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => return Ok(false),
            Err(e) => return Err(self.request_failure("read metadata", name, e)),
        }

        // Removes every version, not just the latest.
        self.bounded("delete", kv2::delete_metadata(client, &self.config.mount_path, name))
            .await?
            .map_err(|e| self.request_failure("delete", name, e))?;

        info!(secret = %name, mount_path = %self.config.mount_path, "Deleted secret from Vault");
        Ok(true)
    }

    async fn list(&self) -> Result<BTreeMap<String, SecretMetadata>> {
        let client = self.client().await?;

        let keys = match self.bounded("list", kv2::list(client, &self.config.mount_path, "")).await? {
            Ok(keys) => keys,
            Err(e) if is_not_found(&e) => Vec::new(),
            Err(e) => return Err(self.request_failure("list", "", e)),
        };

        let mut secrets = BTreeMap::new();
        // Trailing '/' marks a folder, not a secret.
        for key in keys.into_iter().filter(|key| !key.ends_with('/')) {
            let read: Result<std::result::Result<StoredPayload, ClientError>> =
                self.bounded("read", kv2::read(client, &self.config.mount_path, &key)).await;

            let metadata = match read {
                Ok(Ok(payload)) => payload.to_metadata(&key),
                Ok(Err(e)) => {
                    warn!(error = %e, secret = %key, "Failed to read secret metadata from Vault");
                    SecretMetadata::new(&key, BackendKind::Vault)
                }
                Err(e) => {
                    warn!(error = %e, secret = %key, "Failed to read secret metadata from Vault");
                    SecretMetadata::new(&key, BackendKind::Vault)
                }
            };
            secrets.insert(key, metadata);
        }

        Ok(secrets)
    }

    /// Keeps the original `created_at` and expiry, stamps `rotated_at` and
    /// clears the rotation flag.
    async fn rotate(&self, name: &str, new_value: &SecretString) -> Result<()> {
        let current =
            self.read_payload(name).await?.ok_or_else(|| SecretsError::not_found(name))?;

        let now = Utc::now().to_rfc3339();
        let payload = PayloadWrite {
            value: new_value.expose_secret(),
            created_at: current.created_at.clone().unwrap_or_else(|| now.clone()),
            managed_by: MANAGED_BY,
            rotated_at: Some(now),
            metadata: Some(RotationInfo {
                expires_at: current.metadata.as_ref().and_then(|info| info.expires_at.clone()),
                rotation_needed: false,
            }),
        };

        self.write_payload(name, &payload).await?;

        info!(secret = %name, mount_path = %self.config.mount_path, "Rotated secret in Vault");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use tracing_test::traced_test;
    use wiremock::matchers::{any, body_partial_json, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(address: &str) -> VaultConfig {
        VaultConfig {
            address: address.to_string(),
            token: Some("test-token".into()),
            timeout_seconds: 2,
            ..VaultConfig::default()
        }
    }

    /// Wrap `data` in Vault's response envelope.
    fn envelope(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "request_id": "00000000-0000-0000-0000-000000000000",
            "lease_id": "",
            "lease_duration": 0,
            "renewable": false,
            "data": data,
            "warnings": null,
            "wrap_info": null,
            "auth": null
        }))
    }

    fn api_error(status: u16, errors: &[&str]) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(json!({ "errors": errors }))
    }

    fn version_metadata() -> Value {
        json!({
            "created_time": "2025-01-01T00:00:00Z",
            "deletion_time": "",
            "custom_metadata": null,
            "destroyed": false,
            "version": 1
        })
    }

    /// A KV v2 read response holding `payload`.
    fn stored(payload: Value) -> ResponseTemplate {
        envelope(json!({ "data": payload, "metadata": version_metadata() }))
    }

    /// Vault that accepts the token and answers engine setup with `mount_response`.
    async fn vault_server(mount_response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"/auth/token/lookup-self$"))
            .respond_with(envelope(json!({
                "accessor": "accessor",
                "creation_time": 1735689600,
                "creation_ttl": 0,
                "display_name": "token",
                "entity_id": "",
                "expire_time": null,
                "explicit_max_ttl": 0,
                "id": "test-token",
                "identity_policies": null,
                "issue_time": "2025-01-01T00:00:00Z",
                "meta": null,
                "num_uses": 0,
                "orphan": true,
                "path": "auth/token/create",
                "policies": ["default"],
                "renewable": false,
                "ttl": 0
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path_regex(r"/sys/mounts/keyward$"))
            .respond_with(mount_response)
            .mount(&server)
            .await;

        server
    }

    async fn requests_to(server: &MockServer, suffix: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path().ends_with(suffix))
            .count()
    }

    #[test]
    fn test_vault_config_default() {
        let config = VaultConfig::default();
        assert_eq!(config.address, "http://127.0.0.1:8200");
        assert_eq!(config.mount_path, "keyward");
        assert_eq!(config.timeout_seconds, 10);
        assert!(config.token.is_none());
        assert!(config.namespace.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_vault_config_deserialization_defaults() {
        let config: VaultConfig =
            serde_json::from_str(r#"{"address": "https://vault.example.com", "token": "s.abc"}"#)
                .unwrap();

        assert_eq!(config.mount_path, "keyward");
        assert_eq!(config.timeout_seconds, 10);
        assert_eq!(config.token.as_ref().unwrap().expose_secret(), "s.abc");
    }

    #[test]
    fn test_vault_config_never_exposes_token() {
        let config = config_for("https://vault.example.com");

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("test-token"));
        assert!(!format!("{:?}", config).contains("test-token"));
    }

    #[test]
    fn test_vault_config_validation() {
        let mut config = config_for("https://vault.example.com");
        config.timeout_seconds = 0;
        assert!(config.validate().is_err());

        config.timeout_seconds = 5;
        config.address = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_vault_address_must_be_http_url() {
        for address in ["127.0.0.1:8200", "localhost:8200", "vault.internal", "ftp://vault.internal"] {
            assert!(parse_vault_address(address).is_err(), "{} should be rejected", address);
            assert!(config_for(address).validate().is_err(), "{} should fail validation", address);
        }

        for address in ["http://127.0.0.1:8200", "https://vault.example.com", " https://vault:8200 "] {
            assert!(parse_vault_address(address).is_ok(), "{} should be accepted", address);
        }
    }

    #[test]
    fn test_new_rejects_schemeless_address() {
        let err = VaultBackend::new(config_for("127.0.0.1:8200")).unwrap_err();
        assert!(matches!(err, SecretsError::ConfigError { .. }));
    }

    #[test]
    fn test_new_rejects_empty_address() {
        let err = VaultBackend::new(config_for("")).unwrap_err();
        assert!(matches!(err, SecretsError::ConfigError { .. }));
    }

    #[test]
    fn test_debug_hides_client_and_token() {
        let backend = VaultBackend::new(config_for("https://vault.example.com")).unwrap();
        let debug = format!("{:?}", backend);
        assert!(debug.contains("vault.example.com"));
        assert!(debug.contains("connected: false"));
        assert!(!debug.contains("test-token"));
    }

    #[test]
    fn test_payload_write_carries_plaintext_value() {
        let value = SecretString::new("hunter2");
        let metadata = SecretMetadata::new("DB", BackendKind::Vault).with_rotation_needed(true);
        let payload = PayloadWrite {
            value: value.expose_secret(),
            created_at: "2025-01-01T00:00:00+00:00".to_string(),
            managed_by: MANAGED_BY,
            rotated_at: None,
            metadata: Some(RotationInfo::from(&metadata)),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["value"], "hunter2");
        assert_eq!(json["managed_by"], "keyward");
        assert_eq!(json["metadata"]["rotation_needed"], true);
        assert!(json.get("rotated_at").is_none());
    }

    #[test]
    fn test_stored_payload_to_metadata() {
        let payload: StoredPayload = serde_json::from_value(serde_json::json!({
            "value": "v",
            "created_at": "2024-03-01T12:00:00.250000",
            "managed_by": "someone-else",
            "metadata": { "expires_at": "2030-01-01T00:00:00Z", "rotation_needed": true }
        }))
        .unwrap();

        let metadata = payload.to_metadata("API_KEY");
        assert_eq!(metadata.name, "API_KEY");
        assert_eq!(metadata.source, BackendKind::Vault);
        assert_eq!(
            metadata.created_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(250)
        );
        assert_eq!(metadata.expires_at, Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
        assert!(metadata.rotation_needed);
    }

    #[test]
    fn test_stored_payload_only_requires_value() {
        let payload: StoredPayload = serde_json::from_str(r#"{"value": "bare"}"#).unwrap();
        assert_eq!(payload.value.expose_secret(), "bare");

        let metadata = payload.to_metadata("BARE");
        assert!(!metadata.rotation_needed);
        assert!(metadata.expires_at.is_none());
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2025-06-01T08:30:00+02:00").is_some());
        assert!(parse_timestamp("2025-06-01T08:30:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_rejected_token_fails_every_call() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(api_error(403, &["permission denied"]))
            .expect(1)
            .mount(&server)
            .await;

        let backend = VaultBackend::new(config_for(&server.uri())).unwrap();

        let err = backend.get("JWT_SECRET").await.unwrap_err();
        assert!(matches!(err, SecretsError::AuthenticationFailed { .. }));

        // Within the back-off window calls fail without contacting Vault.
        let err = backend.get("JWT_SECRET").await.unwrap_err();
        assert!(matches!(err, SecretsError::ConnectionFailed { .. }));
        assert!(backend.set("JWT_SECRET", &"v".into(), None).await.is_err());
        assert!(backend.list().await.is_err());
        assert!(backend.delete("JWT_SECRET").await.is_err());
        assert!(backend.rotate("JWT_SECRET", &"v2".into()).await.is_err());

        // Nothing is cached after a failed connect.
        assert!(!backend.client.initialized());
    }

    #[tokio::test]
    async fn test_zero_backoff_retries_connect_every_call() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(api_error(403, &["permission denied"]))
            .expect(2)
            .mount(&server)
            .await;

        let config = VaultConfig { retry_backoff_seconds: 0, ..config_for(&server.uri()) };
        let backend = VaultBackend::new(config).unwrap();

        for _ in 0..2 {
            let err = backend.get("JWT_SECRET").await.unwrap_err();
            assert!(matches!(err, SecretsError::AuthenticationFailed { .. }));
        }
    }

    #[tokio::test]
    async fn test_get_reads_value_and_missing_is_absent() {
        let server = vault_server(ResponseTemplate::new(204)).await;
        Mock::given(method("GET"))
            .and(path_regex(r"/keyward/data/JWT_SECRET$"))
            .respond_with(stored(json!({
                "value": "signing-key",
                "created_at": "2025-01-01T00:00:00+00:00",
                "managed_by": "keyward"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"/keyward/data/MISSING$"))
            .respond_with(api_error(404, &[]))
            .mount(&server)
            .await;

        let backend = VaultBackend::new(config_for(&server.uri())).unwrap();

        let value = backend.get("JWT_SECRET").await.unwrap().unwrap();
        assert_eq!(value.expose_secret(), "signing-key");
        assert!(backend.get("MISSING").await.unwrap().is_none());
        assert!(backend.client.initialized());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_existing_kv_mount_is_tolerated() {
        let server = vault_server(api_error(400, &["path is already in use at keyward/"])).await;
        Mock::given(method("GET"))
            .and(path_regex(r"/keyward/data/REDIS_PASSWORD$"))
            .respond_with(stored(json!({ "value": "redis-pw" })))
            .mount(&server)
            .await;

        let backend = VaultBackend::new(config_for(&server.uri())).unwrap();

        for _ in 0..2 {
            let value = backend.get("REDIS_PASSWORD").await.unwrap().unwrap();
            assert_eq!(value.expose_secret(), "redis-pw");
        }

        assert_eq!(requests_to(&server, "/sys/mounts/keyward").await, 1);
        assert!(logs_contain("KV secrets engine already mounted"));
        assert!(!logs_contain("Could not enable KV secrets engine"));
        assert!(!logs_contain("redis-pw"));
    }

    #[tokio::test]
    async fn test_set_writes_managed_payload() {
        let server = vault_server(ResponseTemplate::new(204)).await;
        Mock::given(method("POST"))
            .and(path_regex(r"/keyward/data/DATABASE_PASSWORD$"))
            .and(body_partial_json(json!({
                "data": {
                    "value": "db-pw",
                    "managed_by": "keyward",
                    "metadata": { "rotation_needed": true }
                }
            })))
            .respond_with(envelope(version_metadata()))
            .expect(1)
            .mount(&server)
            .await;

        let backend = VaultBackend::new(config_for(&server.uri())).unwrap();
        let metadata =
            SecretMetadata::new("DATABASE_PASSWORD", BackendKind::Vault).with_rotation_needed(true);

        backend.set("DATABASE_PASSWORD", &"db-pw".into(), Some(&metadata)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rotate_keeps_created_at_and_expiry() {
        let server = vault_server(ResponseTemplate::new(204)).await;
        Mock::given(method("GET"))
            .and(path_regex(r"/keyward/data/SIGNING_KEY$"))
            .respond_with(stored(json!({
                "value": "v1",
                "created_at": "2024-01-01T00:00:00+00:00",
                "managed_by": "keyward",
                "metadata": { "expires_at": "2030-01-01T00:00:00+00:00", "rotation_needed": true }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"/keyward/data/SIGNING_KEY$"))
            .and(body_partial_json(json!({
                "data": {
                    "value": "v2",
                    "created_at": "2024-01-01T00:00:00+00:00",
                    "metadata": { "expires_at": "2030-01-01T00:00:00+00:00", "rotation_needed": false }
                }
            })))
            .respond_with(envelope(version_metadata()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"/keyward/data/NEVER_SET$"))
            .respond_with(api_error(404, &[]))
            .mount(&server)
            .await;

        let backend = VaultBackend::new(config_for(&server.uri())).unwrap();

        backend.rotate("SIGNING_KEY", &"v2".into()).await.unwrap();

        let err = backend.rotate("NEVER_SET", &"v1".into()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_checks_metadata_first() {
        let server = vault_server(ResponseTemplate::new(204)).await;
        Mock::given(method("GET"))
            .and(path_regex(r"/keyward/metadata/GONE$"))
            .respond_with(api_error(404, &[]))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"/keyward/metadata/GONE$"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"/keyward/metadata/OLD_TOKEN$"))
            .respond_with(envelope(json!({
                "cas_required": false,
                "created_time": "2025-01-01T00:00:00Z",
                "current_version": 1,
                "delete_version_after": "0s",
                "max_versions": 0,
                "oldest_version": 0,
                "updated_time": "2025-01-01T00:00:00Z",
                "custom_metadata": null,
                "versions": {}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"/keyward/metadata/OLD_TOKEN$"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let backend = VaultBackend::new(config_for(&server.uri())).unwrap();

        assert!(!backend.delete("GONE").await.unwrap());
        assert!(backend.delete("OLD_TOKEN").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_of_missing_mount_is_empty() {
        let server = vault_server(ResponseTemplate::new(204)).await;
        Mock::given(method("LIST"))
            .and(path_regex(r"/keyward/metadata/?$"))
            .respond_with(api_error(404, &[]))
            .mount(&server)
            .await;

        let backend = VaultBackend::new(config_for(&server.uri())).unwrap();

        assert!(backend.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_survives_unreadable_key() {
        let server = vault_server(ResponseTemplate::new(204)).await;
        Mock::given(method("LIST"))
            .and(path_regex(r"/keyward/metadata/?$"))
            .respond_with(envelope(json!({ "keys": ["API_KEY", "BROKEN", "team/"] })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"/keyward/data/API_KEY$"))
            .respond_with(stored(json!({
                "value": "sk-test",
                "created_at": "2024-01-01T00:00:00+00:00",
                "metadata": { "expires_at": null, "rotation_needed": true }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"/keyward/data/BROKEN$"))
            .respond_with(api_error(500, &["internal error"]))
            .mount(&server)
            .await;

        let backend = VaultBackend::new(config_for(&server.uri())).unwrap();
        let listed = backend.list().await.unwrap();

        assert_eq!(listed.keys().collect::<Vec<_>>(), vec!["API_KEY", "BROKEN"]);
        assert_eq!(listed["API_KEY"].created_at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(listed["API_KEY"].rotation_needed);
        assert_eq!(listed["BROKEN"].source, BackendKind::Vault);
        assert!(!listed["BROKEN"].rotation_needed);
    }

    #[tokio::test]
    async fn test_unreachable_vault_is_an_error() {
        let backend = VaultBackend::new(config_for("http://127.0.0.1:1")).unwrap();

        assert!(backend.get("JWT_SECRET").await.is_err());
        assert!(!backend.client.initialized());
    }
}
