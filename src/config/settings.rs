//! # Configuration Settings
//!
//! Defines the configuration structure for keyward and how it is loaded.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `KEYWARD__SECTION__FIELD` environment variables
//!    (e.g. `KEYWARD__SECRETS__AUDIT_CAPACITY=500`)
//!
//! The conventional `VAULT_ADDR`/`VAULT_TOKEN` and `DOCKER_SECRETS=true`
//! variables are honoured when the corresponding section is not configured.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::errors::{Error, Result};
use crate::secrets::{BackendKind, MountedConfig, VaultConfig, DEFAULT_AUDIT_CAPACITY};

/// Environment variable prefix for layered settings.
pub const ENV_PREFIX: &str = "KEYWARD";

/// Separator between prefix, section and field in environment keys.
pub const ENV_SEPARATOR: &str = "__";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    /// Secret backends and resolution
    #[validate(nested)]
    pub secrets: SecretsSettings,

    /// Log output
    #[validate(nested)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment,
    /// then validate them.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the file is missing or a value has the wrong type
    /// - [`Error::Validation`] if a value is out of range
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply_conventional_env();
        settings.validate()?;

        Ok(settings)
    }

    /// Fill unconfigured backends from `DOCKER_SECRETS` and `VAULT_*`.
    fn apply_conventional_env(&mut self) {
        let docker_secrets = std::env::var("DOCKER_SECRETS")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if docker_secrets {
            self.secrets.mounted.enabled = true;
        }

        if self.secrets.vault.is_none() {
            self.secrets.vault = VaultConfig::from_env();
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    /// Checks that span sections
    fn validate_custom(&self) -> Result<()> {
        if let Some(primary) = self.secrets.primary {
            if !self.secrets.is_configured(primary) {
                return Err(Error::validation(format!(
                    "Primary secret backend '{}' is not configured",
                    primary
                )));
            }
        }

        Ok(())
    }
}

/// Secret backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SecretsSettings {
    /// Backend used for writes and tried first for reads.
    /// Detected from the configured backends when unset.
    pub primary: Option<BackendKind>,

    /// Backend tried when the primary has no value
    pub fallback: Option<BackendKind>,

    /// Number of audit entries retained in memory
    #[validate(range(
        min = 1,
        max = 100000,
        message = "Audit capacity must be between 1 and 100000"
    ))]
    pub audit_capacity: usize,

    pub mounted: MountedConfig,

    #[validate(nested)]
    pub vault: Option<VaultConfig>,

    pub environment: EnvironmentSettings,
}

impl Default for SecretsSettings {
    fn default() -> Self {
        Self {
            primary: None,
            fallback: Some(BackendKind::Environment),
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            mounted: MountedConfig::default(),
            vault: None,
            environment: EnvironmentSettings::default(),
        }
    }
}

impl SecretsSettings {
    /// Whether settings exist that would register `kind`.
    pub fn is_configured(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Mounted => self.mounted.enabled,
            BackendKind::Vault => self.vault.is_some(),
            BackendKind::Environment => true,
        }
    }
}

/// Environment backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Dotfile loaded once into the cache; `None` disables it
    pub env_file: Option<PathBuf>,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self { env_file: Some(PathBuf::from(crate::secrets::env::DEFAULT_ENV_FILE)) }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
