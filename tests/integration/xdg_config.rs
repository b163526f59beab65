//! Integration tests for the global config file location.

use eventlog::config::{global_config_path, ConfigLoader};
use eventlog::telemetry::LogLevel;
use tempfile::TempDir;

use crate::integration::test_utils::{with_isolated_env, write_file};

#[test]
fn test_global_config_path_uses_xdg_config_home() {
    let temp_dir = TempDir::new().unwrap();
    let path = with_isolated_env(&temp_dir, &[], global_config_path).unwrap();
    assert_eq!(path, temp_dir.path().join("eventlog").join("config.toml"));
}

#[test]
fn test_global_config_path_falls_back_to_home() {
    let temp_dir = TempDir::new().unwrap();
    let path = with_isolated_env(&temp_dir, &[("XDG_CONFIG_HOME", "")], global_config_path)
        .unwrap();
    assert_eq!(
        path,
        temp_dir
            .path()
            .join("home")
            .join(".config")
            .join("eventlog")
            .join("config.toml")
    );
}

#[test]
fn test_global_file_is_loaded_and_explicit_file_wins() {
    let temp_dir = TempDir::new().unwrap();
    write_file(
        &temp_dir,
        "eventlog/config.toml",
        "log_level = \"error\"\nconsole_log_prefix = \">> \"\n",
    )
    .unwrap();
    let explicit = write_file(&temp_dir, "override.toml", "log_level = \"debug\"\n").unwrap();

    let (global, layered) = with_isolated_env(&temp_dir, &[], || {
        (
            ConfigLoader::load(None).unwrap(),
            ConfigLoader::load(Some(&explicit)).unwrap(),
        )
    });
    assert_eq!(global.log_level, LogLevel::Error);
    assert_eq!(global.console_log_prefix, ">> ");
    assert_eq!(layered.log_level, LogLevel::Debug);
    assert_eq!(layered.console_log_prefix, ">> ");
}

#[test]
fn test_no_global_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = with_isolated_env(&temp_dir, &[], || ConfigLoader::load(None).unwrap());
    assert_eq!(config.log_level, LogLevel::Normal);
    assert!(!config.buffer.enabled);
}
