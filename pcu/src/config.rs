//! Application configuration
//!
//! Settings come from a YAML file, are overridden by `PCU_*` environment
//! variables and fall back to built-in defaults for every field.

use crate::logging::LogLevel;
use crate::progress::ThemeSettings;
use crate::pypi::{DEFAULT_CONCURRENCY, DEFAULT_INDEX_URL, DEFAULT_TIMEOUT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use thiserror::Error;

/// Project-local config file name
pub const LOCAL_CONFIG_FILE: &str = "pcu.yaml";
/// Prefix for environment overrides, `PCU_LOGGING__LEVEL=DEBUG`
pub const ENV_PREFIX: &str = "PCU_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub app_name: String,
    pub version: String,
    pub debug: bool,
    /// Base URL of the PyPI JSON API
    pub index_url: String,
    pub timeout_secs: u64,
    pub pre_release: bool,
    pub logging: LoggingSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: "python-check-updates".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            debug: false,
            index_url: DEFAULT_INDEX_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            pre_release: false,
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub app_name: String,
    pub level: LogLevel,
    pub log_dir: PathBuf,
    pub console: ConsoleSettings,
    pub file: FileSettings,
    pub json: FileSettings,
    pub progress: ProgressSettings,
    pub parallel: ParallelSettings,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            app_name: "pcu".to_string(),
            level: LogLevel::Warning,
            log_dir: PathBuf::from("logs"),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
            json: FileSettings::default(),
            progress: ProgressSettings::default(),
            parallel: ParallelSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    pub enabled: bool,
    pub show_time: bool,
    pub show_path: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            show_time: false,
            show_path: false,
        }
    }
}

/// Settings for one log file sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub enabled: bool,
    /// e.g. "100 MB"
    pub rotation_size: String,
    pub retention_days: u64,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            rotation_size: "100 MB".to_string(),
            retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    pub theme: String,
    /// User-defined themes, looked up before the built-in ones
    pub themes: BTreeMap<String, ThemeSettings>,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            theme: "neon".to_string(),
            themes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelSettings {
    /// Concurrent registry requests
    pub max_workers: usize,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_CONCURRENCY,
        }
    }
}

impl AppSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        let index = url::Url::parse(&self.index_url)
            .map_err(|e| ConfigError::Invalid(format!("index_url '{}': {e}", self.index_url)))?;
        if !matches!(index.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "index_url must be an http(s) URL, got '{}'",
                self.index_url
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be greater than 0".to_string()));
        }
        if self.logging.parallel.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "logging.parallel.max_workers must be greater than 0".to_string(),
            ));
        }

        for (name, sink) in [("file", &self.logging.file), ("json", &self.logging.json)] {
            if crate::logging::parse_size(&sink.rotation_size).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "logging.{name}.rotation_size '{}' is not a size like \"100 MB\"",
                    sink.rotation_size
                )));
            }
        }
        Ok(())
    }
}

/// Loaded settings plus the raw tree they were built from
#[derive(Debug)]
struct Loaded {
    settings: Arc<AppSettings>,
    tree: Value,
    modified: Option<SystemTime>,
}

/// Owns the active configuration; cheap to read from many threads
#[derive(Debug)]
pub struct ConfigManager {
    path: Option<PathBuf>,
    state: RwLock<Loaded>,
}

impl ConfigManager {
    /// Discover and load the configuration
    ///
    /// An explicit path must exist. Otherwise `./pcu.yaml` and then the user
    /// config directory are tried; with neither present the defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) if !path.is_file() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => discover_config_file(),
        };
        Self::from_path(path)
    }

    /// Load a specific file (or only the defaults when `path` is None)
    pub fn from_path(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let loaded = read_config(path.as_deref(), std::env::vars())?;
        match &path {
            Some(p) => tracing::debug!(path = %p.display(), "loaded configuration"),
            None => tracing::debug!("using default configuration"),
        }
        Ok(Self {
            path,
            state: RwLock::new(loaded),
        })
    }

    /// The file the settings came from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn settings(&self) -> Arc<AppSettings> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.settings)
    }

    /// Look up a value by dotted path, e.g. `logging.file.retention_days`
    ///
    /// Keys that are not part of [`AppSettings`] are reachable too.
    pub fn get_setting<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        if path.trim().is_empty() {
            return None;
        }
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut node = &state.tree;
        for key in path.split('.') {
            node = node.as_mapping()?.get(key)?;
        }
        serde_yaml::from_value(node.clone()).ok()
    }

    /// Re-read the file when it changed on disk
    ///
    /// Returns whether new settings were loaded.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.clone()));
        }

        let current = modified_time(path);
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let (Some(previous), Some(current)) = (state.modified, current)
                && current <= previous
            {
                return Ok(false);
            }
        }

        let loaded = read_config(Some(path), std::env::vars())?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        tracing::info!(path = %path.display(), "configuration reloaded");
        Ok(true)
    }
}

fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("python-check-updates").join("config.yaml"))
        .filter(|p| p.is_file())
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Defaults, then the file, then environment overrides
fn read_config(
    path: Option<&Path>,
    env: impl IntoIterator<Item = (String, String)>,
) -> Result<Loaded, ConfigError> {
    let mut tree = serde_yaml::to_value(AppSettings::default())
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

    let mut modified = None;
    if let Some(path) = path {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        // An empty file parses as null
        if !file.is_null() {
            if !file.is_mapping() {
                return Err(ConfigError::Invalid(format!(
                    "{} must contain a mapping at the top level",
                    path.display()
                )));
            }
            merge(&mut tree, file);
        }
        modified = modified_time(path);
    }

    apply_env_overrides(&mut tree, env);

    let settings: AppSettings =
        serde_yaml::from_value(tree.clone()).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    settings.validate()?;

    Ok(Loaded {
        settings: Arc::new(settings),
        tree,
        modified,
    })
}

/// Deep-merge `overlay` into `base`; mappings merge, everything else replaces
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// `PCU_LOGGING__LEVEL=debug` sets `logging.level`; keys are case-insensitive
fn apply_env_overrides(tree: &mut Value, env: impl IntoIterator<Item = (String, String)>) {
    for (name, raw) in env {
        let Some(key) = name
            .get(..ENV_PREFIX.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(ENV_PREFIX))
            .map(|_| name[ENV_PREFIX.len()..].to_lowercase())
        else {
            continue;
        };
        let path: Vec<&str> = key.split("__").collect();
        if path.iter().any(|segment| segment.is_empty()) {
            continue;
        }

        // YAML scalar rules: "true" is a bool, "30" a number
        let value = serde_yaml::from_str::<Value>(&raw)
            .ok()
            .filter(|v| !v.is_mapping() && !v.is_sequence())
            .unwrap_or_else(|| Value::String(raw.clone()));

        tracing::trace!(variable = %name, "applying environment override");
        set_path(tree, &path, value);
    }
}

fn set_path(tree: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = tree;
    for segment in parents {
        if !node.is_mapping() {
            *node = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(map) = node else { return };
        node = map
            .entry(Value::String((*segment).to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
    }
    if !node.is_mapping() {
        *node = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = node {
        map.insert(Value::String((*last).to_string()), value);
    }
}
