//! Common test utilities for all integration tests.
//!
//! Builds secrets managers over local backends (a temporary mounted
//! directory and the environment backend) so tests never need Vault.

#![allow(dead_code)]

use keyward::config::SecretsSettings;
use keyward::secrets::{BackendKind, MountedConfig, SecretsManager};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

// Serializes tests that read or modify process environment variables.
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// A manager plus the temporary directories backing it.
pub struct TestManager {
    pub manager: SecretsManager,
    pub secrets_dir: TempDir,
    _env_dir: TempDir,
}

/// Settings with mounted enabled in a fresh directory and an env file
/// containing `env_file_lines`.
pub fn local_settings(env_file_lines: &[&str]) -> (SecretsSettings, TempDir, TempDir) {
    let secrets_dir = tempfile::tempdir().expect("create secrets dir");
    let env_dir = tempfile::tempdir().expect("create env dir");

    let env_file = env_dir.path().join(".env");
    let mut file = std::fs::File::create(&env_file).expect("create env file");
    for line in env_file_lines {
        writeln!(file, "{}", line).expect("write env file");
    }

    let mut settings = SecretsSettings::default();
    settings.mounted = MountedConfig {
        enabled: true,
        dir: secrets_dir.path().to_path_buf(),
        prefix: "keyward_".to_string(),
    };
    settings.environment.env_file = Some(env_file);

    (settings, secrets_dir, env_dir)
}

/// Mounted primary with environment fallback.
pub fn mounted_with_env_fallback(env_file_lines: &[&str]) -> TestManager {
    let (settings, secrets_dir, env_dir) = local_settings(env_file_lines);
    TestManager {
        manager: SecretsManager::from_settings(&settings),
        secrets_dir,
        _env_dir: env_dir,
    }
}

/// Only the environment backend, with no env file.
pub fn environment_only() -> SecretsManager {
    let mut settings = SecretsSettings::default();
    settings.primary = Some(BackendKind::Environment);
    settings.environment.env_file = None;
    SecretsManager::from_settings(&settings)
}

/// Path of the file the mounted backend uses for `name`.
pub fn mounted_path(test: &TestManager, name: &str) -> PathBuf {
    test.secrets_dir.path().join(format!("keyward_{}", name))
}
