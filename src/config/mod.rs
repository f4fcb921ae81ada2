//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, level_filters::LevelFilter};
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "strato";
const DATABASE_PATH_ENV: &str = "STRATO_DATABASE_PATH";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 9000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DATABASE_PATH: &str = "data.duckdb";
const DEFAULT_FUNCTION_SCHEMA: &str = "postgisftw";
const DEFAULT_TITLE: &str = "Strato";
const DEFAULT_BASEMAP_URL: &str = "https://demotiles.maplibre.org/style.json";
const DEFAULT_CACHE_MAX_ITEMS: u64 = 10_000;
const DEFAULT_CACHE_MAX_MEMORY_MB: u64 = 1024;
const DEFAULT_BROWSER_CACHE_MAX_AGE_SECS: u64 = 3600;

/// Command-line arguments for the strato binary.
#[derive(Debug, Parser)]
#[command(name = "strato", version, about = "Spatial layer catalog and cache server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STRATO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the URL prefix all routes are mounted under.
    #[arg(long = "server-base-path", value_name = "PATH")]
    pub base_path: Option<String>,

    /// Disable the built-in map viewer pages.
    #[arg(long = "server-disable-ui", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub disable_ui: Option<bool>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(long = "log-json", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub log_json: Option<bool>,

    /// Override the DuckDB database path.
    #[arg(long = "database-path", value_name = "PATH")]
    pub database_path: Option<String>,

    /// Restrict served tables to this list (repeatable).
    #[arg(long = "table-include", value_name = "LAYER")]
    pub table_includes: Option<Vec<String>>,

    /// Hide these tables from the catalog (repeatable).
    #[arg(long = "table-exclude", value_name = "LAYER")]
    pub table_excludes: Option<Vec<String>>,

    /// Trust these schemas for function layers (repeatable).
    #[arg(long = "function-include", value_name = "SCHEMA")]
    pub function_includes: Option<Vec<String>>,

    /// Toggle the response cache.
    #[arg(long = "cache-enabled", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub cache_enabled: Option<bool>,

    /// Override the cache entry budget.
    #[arg(long = "cache-max-items", value_name = "COUNT")]
    pub cache_max_items: Option<u64>,

    /// Override the cache memory budget in MiB.
    #[arg(long = "cache-max-memory-mb", value_name = "MIB")]
    pub cache_max_memory_mb: Option<u64>,

    /// Override the Cache-Control max-age for public responses.
    #[arg(long = "browser-cache-max-age", value_name = "SECONDS")]
    pub browser_cache_max_age: Option<u64>,

    /// Remove the cache admin endpoints entirely.
    #[arg(long = "cache-disable-api", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub cache_disable_api: Option<bool>,

    /// API key required by the admin endpoints.
    #[arg(long = "cache-api-key", value_name = "KEY", env = "STRATO_CACHE_API_KEY")]
    pub cache_api_key: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub metadata: MetadataSettings,
    pub website: WebsiteSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Normalized URL prefix: empty, or `/segment` with no trailing slash.
    pub base_path: String,
    pub disable_ui: bool,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub path: String,
    pub table_includes: Vec<String>,
    pub table_excludes: Vec<String>,
    pub function_includes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MetadataSettings {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct WebsiteSettings {
    pub basemap_url: Url,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_items: usize,
    pub max_memory_mb: u64,
    pub browser_cache_max_age: Duration,
    pub disable_api: bool,
    /// `None` leaves the admin endpoints public.
    pub api_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
///
/// `STRATO_DATABASE_PATH` is honored as a direct override of
/// `database.path`, sitting between the generic environment mapping and
/// the CLI flags.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("STRATO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    if let Ok(path) = env::var(DATABASE_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            raw.database.path = Some(trimmed.to_string());
        }
    }

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

impl Settings {
    /// Logs the effective, non-secret configuration once at startup.
    pub fn log_summary(&self) {
        debug!(
            addr = %self.server.addr,
            base_path = %self.server.base_path,
            disable_ui = self.server.disable_ui,
            database = %self.database.path,
            table_includes = self.database.table_includes.len(),
            table_excludes = self.database.table_excludes.len(),
            function_includes = ?self.database.function_includes,
            cache_enabled = self.cache.enabled,
            cache_max_items = self.cache.max_items,
            cache_max_memory_mb = self.cache.max_memory_mb,
            cache_admin_api = !self.cache.disable_api,
            cache_key_set = self.cache.api_key.is_some(),
            "effective configuration"
        );
    }

    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            metadata,
            website,
            cache,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            metadata: build_metadata_settings(metadata),
            website: build_website_settings(website)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    metadata: RawMetadataSettings,
    website: RawWebsiteSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(base_path) = overrides.base_path.as_ref() {
            self.server.base_path = Some(base_path.clone());
        }
        if let Some(disable_ui) = overrides.disable_ui {
            self.server.disable_ui = Some(disable_ui);
        }
        if let Some(seconds) = overrides.graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.database_path.as_ref() {
            self.database.path = Some(path.clone());
        }
        if let Some(includes) = overrides.table_includes.as_ref() {
            self.database.table_includes = Some(includes.clone());
        }
        if let Some(excludes) = overrides.table_excludes.as_ref() {
            self.database.table_excludes = Some(excludes.clone());
        }
        if let Some(schemas) = overrides.function_includes.as_ref() {
            self.database.function_includes = Some(schemas.clone());
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(max_items) = overrides.cache_max_items {
            self.cache.max_items = Some(max_items);
        }
        if let Some(max_memory_mb) = overrides.cache_max_memory_mb {
            self.cache.max_memory_mb = Some(max_memory_mb);
        }
        if let Some(max_age) = overrides.browser_cache_max_age {
            self.cache.browser_cache_max_age = Some(max_age);
        }
        if let Some(disable_api) = overrides.cache_disable_api {
            self.cache.disable_api = Some(disable_api);
        }
        if let Some(api_key) = overrides.cache_api_key.as_ref() {
            self.cache.api_key = Some(api_key.clone());
        }
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let base_path = normalize_base_path(server.base_path.as_deref().unwrap_or(""));

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        base_path,
        disable_ui: server.disable_ui.unwrap_or(false),
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let path = database
        .path
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());
    if path.is_empty() {
        return Err(LoadError::invalid(
            "database.path",
            "path must not be empty",
        ));
    }

    Ok(DatabaseSettings {
        path,
        table_includes: clean_list(database.table_includes.unwrap_or_default()),
        table_excludes: clean_list(database.table_excludes.unwrap_or_default()),
        function_includes: database
            .function_includes
            .map(clean_list)
            .unwrap_or_else(|| vec![DEFAULT_FUNCTION_SCHEMA.to_string()]),
    })
}

fn build_metadata_settings(metadata: RawMetadataSettings) -> MetadataSettings {
    MetadataSettings {
        title: metadata
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        description: metadata.description.unwrap_or_default(),
    }
}

fn build_website_settings(website: RawWebsiteSettings) -> Result<WebsiteSettings, LoadError> {
    let raw_url = website
        .basemap_url
        .unwrap_or_else(|| DEFAULT_BASEMAP_URL.to_string());
    let basemap_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("website.basemap_url", err.to_string()))?;
    Ok(WebsiteSettings { basemap_url })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_items_value = cache.max_items.unwrap_or(DEFAULT_CACHE_MAX_ITEMS);
    if max_items_value == 0 {
        return Err(LoadError::invalid(
            "cache.max_items",
            "must be greater than zero",
        ));
    }
    let max_items = usize::try_from(max_items_value)
        .map_err(|_| LoadError::invalid("cache.max_items", "value exceeds supported range"))?;

    let max_memory_mb = cache.max_memory_mb.unwrap_or(DEFAULT_CACHE_MAX_MEMORY_MB);
    if max_memory_mb == 0 {
        return Err(LoadError::invalid(
            "cache.max_memory_mb",
            "must be greater than zero",
        ));
    }

    let api_key = cache.api_key.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        max_items,
        max_memory_mb,
        browser_cache_max_age: Duration::from_secs(
            cache
                .browser_cache_max_age
                .unwrap_or(DEFAULT_BROWSER_CACHE_MAX_AGE_SECS),
        ),
        disable_api: cache.disable_api.unwrap_or(false),
        api_key,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    base_path: Option<String>,
    disable_ui: Option<bool>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    path: Option<String>,
    table_includes: Option<Vec<String>>,
    table_excludes: Option<Vec<String>>,
    function_includes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMetadataSettings {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWebsiteSettings {
    basemap_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    max_items: Option<u64>,
    max_memory_mb: Option<u64>,
    browser_cache_max_age: Option<u64>,
    disable_api: Option<bool>,
    api_key: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}
