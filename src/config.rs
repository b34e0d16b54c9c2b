//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or an explicit path), then applies `TRIPLEGATE_LOG_LEVEL` and
//! `TRIPLEGATE_STORE_URL` env overrides.

use std::{
    env,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Store backend configuration (`[store]`).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `"dgraph"` or `"memory"`.
    pub backend: String,
    /// Base URL of the Dgraph alpha HTTP endpoint.
    pub url: String,
    /// Ping the store once at startup and fail fast if unreachable.
    pub probe: bool,
    /// Upper bound for the startup health probe.
    pub probe_timeout: Duration,
}

/// Mutation worker timeouts (`[serializer]`).
#[derive(Debug, Clone, Copy)]
pub struct SerializerConfig {
    /// Passed to the store with every mutate / query.
    pub apply_timeout: Duration,
    /// How long a caller waits for the worker's reply. Always greater than
    /// `apply_timeout`.
    pub call_timeout: Duration,
}

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub log_level: String,
    /// Append logs here instead of stderr (already expanded, no `~`).
    pub log_file: Option<PathBuf>,
    /// Drop all data and reinstall the schema before serving.
    pub reset_on_start: bool,
    /// Start the stdio console.
    pub console: bool,
    pub store: StoreConfig,
    pub serializer: SerializerConfig,
    /// From `DGRAPH_ACCESS_TOKEN` env. Never sourced from TOML.
    pub access_token: Option<String>,
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    service: RawService,
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    serializer: RawSerializer,
}

#[derive(Deserialize)]
struct RawService {
    #[serde(default = "default_service_name")]
    name: String,
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
    #[serde(default)]
    reset_on_start: bool,
    #[serde(default = "default_true")]
    console: bool,
}

#[derive(Deserialize)]
struct RawStore {
    #[serde(default = "default_backend")]
    backend: String,
    #[serde(default = "default_store_url")]
    url: String,
    #[serde(default = "default_true")]
    probe: bool,
    #[serde(default = "default_probe_timeout_ms")]
    probe_timeout_ms: u64,
}

impl Default for RawStore {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_store_url(),
            probe: true,
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

#[derive(Deserialize)]
struct RawSerializer {
    #[serde(default = "default_apply_timeout_ms")]
    apply_timeout_ms: u64,
    #[serde(default = "default_call_timeout_ms")]
    call_timeout_ms: u64,
}

impl Default for RawSerializer {
    fn default() -> Self {
        Self {
            apply_timeout_ms: default_apply_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

fn default_service_name() -> String { "triplegate".to_string() }
fn default_backend() -> String { "dgraph".to_string() }
fn default_store_url() -> String { "http://localhost:8080".to_string() }
fn default_probe_timeout_ms() -> u64 { 5_000 }
fn default_apply_timeout_ms() -> u64 { 5_000 }
fn default_call_timeout_ms() -> u64 { 6_000 }

fn default_true() -> bool {
    true
}

/// Load config from `path` (default `config/default.toml`), then apply
/// env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let path = path
        .map(str::to_string)
        .or_else(|| env::var("TRIPLEGATE_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let log_level_override = env::var("TRIPLEGATE_LOG_LEVEL").ok();
    let store_url_override = env::var("TRIPLEGATE_STORE_URL").ok();
    let mut config = load_from(
        Path::new(&path),
        log_level_override.as_deref(),
        store_url_override.as_deref(),
    )?;
    config.access_token = env::var("DGRAPH_ACCESS_TOKEN").ok().filter(|t| !t.is_empty());
    Ok(config)
}

/// Internal loader. Accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    log_level_override: Option<&str>,
    store_url_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.service;
    let st = parsed.store;
    let sz = parsed.serializer;

    if !matches!(st.backend.as_str(), "dgraph" | "memory") {
        return Err(AppError::Config(format!("unknown store backend: {}", st.backend)));
    }
    if sz.apply_timeout_ms == 0 || sz.call_timeout_ms <= sz.apply_timeout_ms {
        return Err(AppError::Config(format!(
            "serializer.call_timeout_ms ({}) must be greater than apply_timeout_ms ({}), and both non-zero",
            sz.call_timeout_ms, sz.apply_timeout_ms
        )));
    }

    Ok(Config {
        service_name: s.name,
        log_level: log_level_override.unwrap_or(&s.log_level).to_string(),
        log_file: s.log_file.as_deref().map(expand_home),
        reset_on_start: s.reset_on_start,
        console: s.console,
        store: StoreConfig {
            backend: st.backend,
            url: store_url_override.unwrap_or(&st.url).to_string(),
            probe: st.probe,
            probe_timeout: Duration::from_millis(st.probe_timeout_ms),
        },
        serializer: SerializerConfig {
            apply_timeout: Duration::from_millis(sz.apply_timeout_ms),
            call_timeout: Duration::from_millis(sz.call_timeout_ms),
        },
        access_token: None,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: memory backend, no network.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            service_name: "test".into(),
            log_level: "info".into(),
            log_file: None,
            reset_on_start: false,
            console: false,
            store: StoreConfig {
                backend: "memory".into(),
                url: "http://localhost:0".into(),
                probe: false,
                probe_timeout: Duration::from_secs(1),
            },
            serializer: SerializerConfig {
                apply_timeout: Duration::from_millis(500),
                call_timeout: Duration::from_millis(1_000),
            },
            access_token: None,
        }
    }
}
