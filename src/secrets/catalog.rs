//! Catalog of well-known secrets and provisioning helpers.
//!
//! [`provision_api_keys`] copies API keys found in the process environment
//! into the primary backend so later reads no longer depend on how the
//! process was launched. [`ensure_secret`] generates a random value for
//! security-critical keys that have never been set.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use super::manager::SecretsManager;
use super::types::SecretString;

/// Token signing key.
pub const JWT_SECRET: &str = "JWT_SECRET";
/// Symmetric data encryption key.
pub const ENCRYPTION_KEY: &str = "ENCRYPTION_KEY";
pub const DATABASE_PASSWORD: &str = "DATABASE_PASSWORD";
pub const REDIS_PASSWORD: &str = "REDIS_PASSWORD";

/// Number of random bytes in a generated secret.
const GENERATED_SECRET_BYTES: usize = 32;

/// A third-party API credential the application knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// Short identifier used in provisioning reports
    pub key: &'static str,
    /// Secret name, also the environment variable it is migrated from
    pub env_name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

pub const API_KEYS: &[CatalogEntry] = &[
    CatalogEntry {
        key: "openai",
        env_name: "OPENAI_API_KEY",
        required: true,
        description: "OpenAI API key",
    },
    CatalogEntry {
        key: "anthropic",
        env_name: "ANTHROPIC_API_KEY",
        required: true,
        description: "Anthropic API key",
    },
    CatalogEntry {
        key: "perplexity",
        env_name: "PERPLEXITY_API_KEY",
        required: true,
        description: "Perplexity API key",
    },
    CatalogEntry {
        key: "slack_bot",
        env_name: "SLACK_BOT_TOKEN",
        required: false,
        description: "Slack bot token",
    },
    CatalogEntry {
        key: "slack_webhook",
        env_name: "SLACK_WEBHOOK_URL",
        required: false,
        description: "Slack incoming webhook URL",
    },
    CatalogEntry {
        key: "discord_bot",
        env_name: "DISCORD_BOT_TOKEN",
        required: false,
        description: "Discord bot token",
    },
    CatalogEntry {
        key: "discord_webhook",
        env_name: "DISCORD_WEBHOOK_URL",
        required: false,
        description: "Discord webhook URL",
    },
    CatalogEntry {
        key: "github",
        env_name: "GITHUB_TOKEN",
        required: true,
        description: "GitHub access token",
    },
    CatalogEntry {
        key: "vercel",
        env_name: "VERCEL_TOKEN",
        required: false,
        description: "Vercel deployment token",
    },
    CatalogEntry {
        key: "sentry",
        env_name: "SENTRY_DSN",
        required: false,
        description: "Sentry DSN",
    },
];

/// Make every catalog key resolvable where possible.
///
/// For each entry: already resolvable is `true`; otherwise a non-empty
/// environment variable of the same name is written to the primary backend
/// and the result is whether that write succeeded; otherwise `false`.
pub async fn provision_api_keys(manager: &SecretsManager) -> BTreeMap<&'static str, bool> {
    provision(manager, API_KEYS).await
}

pub(crate) async fn provision(
    manager: &SecretsManager,
    entries: &[CatalogEntry],
) -> BTreeMap<&'static str, bool> {
    let mut results = BTreeMap::new();

    info!(entries = entries.len(), "Provisioning API keys");

    for entry in entries {
        let provisioned = if manager.secret_exists(entry.env_name, None).await {
            info!(key = entry.key, "API key already configured");
            true
        } else {
            match std::env::var(entry.env_name).ok().filter(|value| !value.is_empty()) {
                Some(value) => {
                    let migrated =
                        manager.set_secret(entry.env_name, &SecretString::new(value), None).await;
                    if migrated {
                        info!(key = entry.key, "API key migrated from environment");
                    } else {
                        error!(key = entry.key, "Failed to migrate API key from environment");
                    }
                    migrated
                }
                None if entry.required => {
                    warn!(key = entry.key, env_name = entry.env_name, "Required API key is not configured");
                    false
                }
                None => {
                    info!(key = entry.key, "Optional API key is not configured");
                    false
                }
            }
        };

        results.insert(entry.key, provisioned);
    }

    results
}

/// A fresh random secret: 32 bytes, URL-safe base64 without padding.
pub fn generate_secret_value() -> SecretString {
    let bytes: [u8; GENERATED_SECRET_BYTES] = rand::thread_rng().gen();
    SecretString::new(URL_SAFE_NO_PAD.encode(bytes))
}

/// Return `name`, generating and storing a random value if it is unset.
///
/// The generated value is returned even if storing it failed, so the
/// caller can run with an ephemeral key.
pub async fn ensure_secret(manager: &SecretsManager, name: &str) -> SecretString {
    if let Some(existing) = manager.get_secret(name, None).await {
        return existing;
    }

    warn!(secret = %name, "Secret not configured, generating a random value");
    let generated = generate_secret_value();

    if !manager.set_secret(name, &generated, None).await {
        error!(secret = %name, "Generated secret could not be stored and will not survive a restart");
    }

    generated
}
