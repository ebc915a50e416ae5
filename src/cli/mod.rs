//! # Command Line Interface
//!
//! Operator commands over the secrets manager: read, write, delete and
//! rotate secrets, inspect metadata, the audit log and backend health, and
//! provision the well-known keys.

pub mod output;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;
use crate::observability::init_logging;
use crate::secrets::{
    ensure_secret, generate_secret_value, provision_api_keys, BackendKind, SecretString,
    SecretsManager, ENCRYPTION_KEY, JWT_SECRET,
};
use output::{audit_table, health_table, print_output, secrets_table, OutputFormat};

#[derive(Parser)]
#[command(name = "keyward")]
#[command(about = "Secret management over mounted secrets, Vault and the environment")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Look up a secret
    Get {
        name: String,

        /// Only query this backend
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Print the value instead of only reporting that it exists
        #[arg(long)]
        reveal: bool,
    },

    /// Store a secret
    Set {
        name: String,
        value: String,

        /// Target backend (default: primary)
        #[arg(long)]
        backend: Option<BackendKind>,
    },

    /// Delete a secret
    Delete {
        name: String,

        /// Target backend (default: primary)
        #[arg(long)]
        backend: Option<BackendKind>,
    },

    /// Replace the value of an existing secret
    Rotate {
        name: String,

        /// New value; a random one is generated when omitted
        value: Option<String>,

        /// Target backend (default: primary)
        #[arg(long)]
        backend: Option<BackendKind>,
    },

    /// List secret metadata from every backend
    List {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Show the audit log
    Audit {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Check every backend
    Health {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Migrate API keys from the environment and generate missing signing keys
    Provision,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    init_logging(&settings.logging, cli.verbose);

    let manager = SecretsManager::from_settings(&settings.secrets);
    let result = execute(cli.command, &manager).await;
    manager.shutdown();

    result
}

/// Execute one command against `manager`.
///
/// A mutation the manager reports as unsuccessful is returned as an error so
/// the process exits non-zero.
pub async fn execute(command: Commands, manager: &SecretsManager) -> anyhow::Result<()> {
    match command {
        Commands::Get { name, backend, reveal } => match manager.get_secret(&name, backend).await {
            Some(value) if reveal => println!("{}", value.expose_secret()),
            Some(_) => println!("{}: present", name),
            None => bail!("Secret '{}' not found", name),
        },
        Commands::Set { name, value, backend } => {
            if !manager.set_secret(&name, &SecretString::new(value), backend).await {
                bail!("Failed to store secret '{}'", name);
            }
            println!("Stored secret '{}'", name);
        }
        Commands::Delete { name, backend } => {
            if !manager.delete_secret(&name, backend).await {
                bail!("Secret '{}' was not deleted", name);
            }
            println!("Deleted secret '{}'", name);
        }
        Commands::Rotate { name, value, backend } => {
            let new_value = value.map(SecretString::new).unwrap_or_else(generate_secret_value);
            if !manager.rotate_secret(&name, &new_value, backend).await {
                bail!("Failed to rotate secret '{}'", name);
            }
            println!("Rotated secret '{}'", name);
        }
        Commands::List { output } => {
            let listing = manager.list_all_secrets().await;
            print_output(&listing, output, secrets_table)?;
        }
        Commands::Audit { output } => {
            let entries = manager.get_audit_log();
            print_output(&entries, output, |entries| audit_table(entries))?;
        }
        Commands::Health { output } => {
            let health = manager.health_check().await;
            print_output(&health, output, health_table)?;
            if health.values().any(|healthy| !healthy) {
                bail!("One or more secret backends are unhealthy");
            }
        }
        Commands::Provision => provision(manager).await?,
    }

    Ok(())
}

async fn provision(manager: &SecretsManager) -> anyhow::Result<()> {
    let results = provision_api_keys(manager).await;
    for (key, configured) in &results {
        println!("{:<16} {}", key, if *configured { "configured" } else { "missing" });
    }

    for name in [JWT_SECRET, ENCRYPTION_KEY] {
        ensure_secret(manager, name).await;
        println!("{:<16} ensured", name);
    }

    Ok(())
}
