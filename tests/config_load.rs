//! Precedence and validation tests for configuration loading: defaults,
//! file values, `STRATO__*` environment mapping, the dedicated
//! `STRATO_DATABASE_PATH` override, and CLI flags on top.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serial_test::serial;
use strato::config::{self, CliArgs, LoadError, LogFormat};
use tempfile::TempDir;
use tracing::level_filters::LevelFilter;

/// Restores the previous value of one environment variable on drop, so a
/// failing assertion cannot leak state into the next serial test.
struct EnvVarGuard {
    key: &'static str,
    previous: Option<String>,
}

impl EnvVarGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let previous = std::env::var(key).ok();
        // SAFETY: every test touching the environment is #[serial], so no
        // other thread reads or writes it concurrently.
        unsafe { std::env::set_var(key, value) };
        Self { key, previous }
    }

    fn unset(key: &'static str) -> Self {
        let previous = std::env::var(key).ok();
        // SAFETY: see `set`.
        unsafe { std::env::remove_var(key) };
        Self { key, previous }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        // SAFETY: see `set`.
        unsafe {
            match self.previous.take() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }
}

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("strato-test.toml");
    fs::write(&path, contents).expect("config file should write");
    path
}

fn cli_with_config(path: &Path) -> CliArgs {
    CliArgs::parse_from(["strato", "--config-file", path.to_str().expect("utf-8 path")])
}

#[test]
#[serial]
fn file_values_flow_into_settings() {
    let _db_env = EnvVarGuard::unset("STRATO_DATABASE_PATH");
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
[server]
host = "127.0.0.1"
port = 9100
base_path = "tiles/"
disable_ui = true
graceful_shutdown_seconds = 5

[logging]
level = "debug"
json = true

[database]
path = "/data/world.duckdb"
table_includes = ["roads", " lakes "]
function_includes = []

[metadata]
title = "World Atlas"
description = "Demo layers"

[website]
basemap_url = "https://example.com/style.json"

[cache]
enabled = false
max_items = 64
max_memory_mb = 8
browser_cache_max_age = 60
disable_api = true
api_key = "  "
"#,
    );

    let settings = config::load(&cli_with_config(&path)).expect("settings should load");

    assert_eq!(
        settings.server.addr,
        "127.0.0.1:9100".parse().expect("socket addr")
    );
    assert_eq!(settings.server.base_path, "/tiles");
    assert!(settings.server.disable_ui);
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(5));

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));

    assert_eq!(settings.database.path, "/data/world.duckdb");
    assert_eq!(settings.database.table_includes, vec!["roads", "lakes"]);
    assert!(
        settings.database.function_includes.is_empty(),
        "an explicit empty list closes the function allowlist"
    );

    assert_eq!(settings.metadata.title, "World Atlas");
    assert_eq!(settings.website.basemap_url.as_str(), "https://example.com/style.json");

    assert!(!settings.cache.enabled);
    assert_eq!(settings.cache.max_items, 64);
    assert_eq!(settings.cache.max_memory_mb, 8);
    assert_eq!(settings.cache.browser_cache_max_age, Duration::from_secs(60));
    assert!(settings.cache.disable_api);
    assert_eq!(settings.cache.api_key, None, "blank keys mean public admin");
}

#[test]
#[serial]
fn environment_overrides_the_file() {
    let _db_env = EnvVarGuard::unset("STRATO_DATABASE_PATH");
    let _port = EnvVarGuard::set("STRATO__SERVER__PORT", "9300");
    let _items = EnvVarGuard::set("STRATO__CACHE__MAX_ITEMS", "77");

    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
[server]
port = 9200

[cache]
max_items = 10
"#,
    );

    let settings = config::load(&cli_with_config(&path)).expect("settings should load");
    assert_eq!(settings.server.addr.port(), 9300);
    assert_eq!(settings.cache.max_items, 77);
}

#[test]
#[serial]
fn database_path_env_beats_the_generic_mapping() {
    let _generic = EnvVarGuard::set("STRATO__DATABASE__PATH", "generic.duckdb");
    let _direct = EnvVarGuard::set("STRATO_DATABASE_PATH", "direct.duckdb");

    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
[database]
path = "from-file.duckdb"
"#,
    );

    let settings = config::load(&cli_with_config(&path)).expect("settings should load");
    assert_eq!(settings.database.path, "direct.duckdb");
}

#[test]
#[serial]
fn cli_flags_sit_above_the_environment() {
    let _db_env = EnvVarGuard::unset("STRATO_DATABASE_PATH");
    let _port = EnvVarGuard::set("STRATO__SERVER__PORT", "9400");

    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "");

    let args = CliArgs::parse_from([
        "strato",
        "--config-file",
        path.to_str().expect("utf-8 path"),
        "serve",
        "--server-port",
        "9500",
        "--cache-api-key",
        "cli-secret",
    ]);

    let settings = config::load(&args).expect("settings should load");
    assert_eq!(settings.server.addr.port(), 9500);
    assert_eq!(settings.cache.api_key.as_deref(), Some("cli-secret"));
}

#[test]
#[serial]
fn zero_cache_budgets_are_rejected() {
    let _db_env = EnvVarGuard::unset("STRATO_DATABASE_PATH");
    let dir = TempDir::new().expect("temp dir");

    let path = write_config(&dir, "[cache]\nmax_items = 0\n");
    let err = config::load(&cli_with_config(&path)).expect_err("zero items must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_items",
            ..
        }
    ));

    let path = write_config(&dir, "[cache]\nmax_memory_mb = 0\n");
    let err = config::load(&cli_with_config(&path)).expect_err("zero memory must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_memory_mb",
            ..
        }
    ));
}

#[test]
#[serial]
fn missing_explicit_config_file_fails() {
    let args = cli_with_config(Path::new("/definitely/missing/strato.toml"));
    let err = config::load(&args).expect_err("a named file must exist");
    assert!(matches!(err, LoadError::Build(_)));
}
