//! Shared output formatting utilities for CLI commands
//!
//! Provides consistent output formatting across all CLI commands with support
//! for JSON, YAML, and table formats. Only metadata, audit entries and
//! health flags are ever printed through here; secret values are not.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::secrets::{AuditEntry, BackendKind, SecretMetadata};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Print `data` as JSON or YAML, or call `table` to render it.
pub fn print_output<T, F>(data: &T, format: OutputFormat, table: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Json => print_json(data),
        OutputFormat::Yaml => print_yaml(data),
        OutputFormat::Table => {
            print!("{}", table(data));
            Ok(())
        }
    }
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn table_header(columns: &[(&str, usize)]) -> String {
    let mut header = String::new();
    for (name, width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = width));
    }

    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    format!("{}\n{}\n", header.trim_end(), "-".repeat(total_width.saturating_sub(1)))
}

/// Secrets grouped by backend.
pub fn secrets_table(listing: &BTreeMap<BackendKind, BTreeMap<String, SecretMetadata>>) -> String {
    let columns = [("BACKEND", 12), ("NAME", 32), ("CREATED", 20), ("ROTATE", 6)];
    let mut out = table_header(&columns);

    for (kind, secrets) in listing {
        for (name, metadata) in secrets {
            let row = format!(
                "{:<12} {:<32} {:<20} {}",
                kind.as_str(),
                truncate(name, 32),
                metadata.created_at.format("%Y-%m-%d %H:%M:%S"),
                if metadata.rotation_needed { "yes" } else { "no" },
            );
            out.push_str(row.trim_end());
            out.push('\n');
        }
    }

    out
}

/// Audit entries, oldest first.
pub fn audit_table(entries: &[AuditEntry]) -> String {
    let columns = [("TIMESTAMP", 20), ("OPERATION", 10), ("BACKEND", 12), ("SECRET", 32)];
    let mut out = table_header(&columns);

    for entry in entries {
        let row = format!(
            "{:<20} {:<10} {:<12} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.operation.to_string(),
            entry.backend.as_str(),
            truncate(&entry.secret_name, 32),
        );
        out.push_str(&row);
        out.push('\n');
    }

    out
}

/// One line per backend.
pub fn health_table(health: &BTreeMap<BackendKind, bool>) -> String {
    let columns = [("BACKEND", 12), ("STATUS", 9)];
    let mut out = table_header(&columns);

    for (kind, healthy) in health {
        let status = if *healthy { "healthy" } else { "unhealthy" };
        out.push_str(&format!("{:<12} {}\n", kind.as_str(), status));
    }

    out
}
