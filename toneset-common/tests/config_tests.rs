//! Integration tests for config file resolution and loading
//!
//! Tests cover:
//! - Priority order: CLI argument > TONESET_CONFIG > user config > defaults
//! - Missing files degrade to defaults with a warning
//! - Malformed files are reported as configuration errors
//!
//! Note: tests that manipulate TONESET_CONFIG are marked #[serial] so they do not
//! race each other.

use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use toneset_common::config::{
    load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR,
};
use toneset_common::Error;

#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default)]
    subject_id: u32,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/toneset-env.toml");
    let path = resolve_config_path(None, CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Some(PathBuf::from("/tmp/toneset-env.toml")));
}

#[test]
#[serial]
fn test_cli_argument_overrides_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/toneset-env.toml");
    let path = resolve_config_path(Some(Path::new("/tmp/toneset-cli.toml")), CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Some(PathBuf::from("/tmp/toneset-cli.toml")));
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "");
    let path = resolve_config_path(None, CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);

    // Either no file or the per-user file, never the empty string
    assert_ne!(path, Some(PathBuf::new()));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let settings: Settings = load_toml_or_default(Some(&missing)).unwrap();
    assert_eq!(settings.subject_id, 0);
    assert_eq!(settings.logging, LoggingConfig::default());
}

#[test]
fn test_no_path_falls_back_to_defaults() {
    let settings: Settings = load_toml_or_default(None).unwrap();
    assert_eq!(settings.subject_id, 0);
}

#[test]
fn test_existing_file_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "subject_id = 17").unwrap();
    writeln!(file, "[logging]").unwrap();
    writeln!(file, "level = \"debug\"").unwrap();

    let settings: Settings = load_toml_or_default(Some(file.path())).unwrap();
    assert_eq!(settings.subject_id, 17);
    assert_eq!(settings.logging.level, "debug");
}

#[test]
fn test_malformed_file_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "subject_id = \"seventeen\"").unwrap();

    let result: toneset_common::Result<Settings> = load_toml_or_default(Some(file.path()));
    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("subject_id") || msg.contains("invalid")),
        other => panic!("expected config error, got {:?}", other),
    }
}
