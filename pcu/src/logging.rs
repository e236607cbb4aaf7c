//! Structured logging
//!
//! Console output goes to stderr so it never mixes with the report on
//! stdout. Optional plain-text and JSON files capture everything at DEBUG.

use crate::config::{FileSettings, LoggingSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context as LayerContext, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt as tracing_fmt};

/// Configured log level
///
/// SUCCESS and CRITICAL are accepted for compatibility with common config
/// files; they map onto INFO and ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Success,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    pub fn to_tracing(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info | LogLevel::Success => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error | LogLevel::Critical => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "SUCCESS" => Ok(LogLevel::Success),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(format!("unknown log level '{s}'")),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, <LogLevel as TryFrom<String>>::Error> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

/// Console level after `-v` flags and the `debug` setting
pub fn console_level(configured: LogLevel, verbosity: u8, debug: bool) -> Level {
    let mut level = configured.to_tracing();
    let requested = match verbosity {
        0 if debug => Some(Level::DEBUG),
        0 => None,
        1 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    };
    // tracing orders levels by verbosity: TRACE > DEBUG > INFO
    if let Some(requested) = requested
        && requested > level
    {
        level = requested;
    }
    level
}

/// Parse a size such as `"100 MB"`, `"512KB"` or `"1024"` into bytes
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let number: u64 = text[..split].parse().ok()?;
    let multiplier: u64 = match text[split..].trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

/// Counters fed by every event that passes the global filter
#[derive(Debug, Clone)]
pub struct LogStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug)]
struct StatsInner {
    started: Instant,
    total: AtomicU64,
    errors: AtomicU64,
    by_level: Mutex<BTreeMap<String, u64>>,
}

/// Point-in-time view of [`LogStats`]
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub total_messages: u64,
    pub messages_by_level: BTreeMap<String, u64>,
    pub errors_count: u64,
    pub uptime: Duration,
    pub messages_per_second: f64,
}

impl Default for LogStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatsInner {
                started: Instant::now(),
                total: AtomicU64::new(0),
                errors: AtomicU64::new(0),
                by_level: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn record(&self, level: &Level) {
        self.inner.total.fetch_add(1, Ordering::Relaxed);
        if *level == Level::ERROR {
            self.inner.errors.fetch_add(1, Ordering::Relaxed);
        }
        let mut by_level = self.inner.by_level.lock().unwrap_or_else(PoisonError::into_inner);
        *by_level.entry(level.to_string()).or_default() += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let uptime = self.inner.started.elapsed();
        let total_messages = self.inner.total.load(Ordering::Relaxed);
        let seconds = uptime.as_secs_f64();
        StatsSnapshot {
            total_messages,
            messages_by_level: self
                .inner
                .by_level
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            errors_count: self.inner.errors.load(Ordering::Relaxed),
            uptime,
            messages_per_second: if seconds > 0.0 {
                total_messages as f64 / seconds
            } else {
                0.0
            },
        }
    }

    /// Layer that feeds these counters
    pub fn layer(&self) -> StatsLayer {
        StatsLayer {
            stats: self.clone(),
        }
    }
}

pub struct StatsLayer {
    stats: LogStats,
}

impl<S: Subscriber> Layer<S> for StatsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        self.stats.record(event.metadata().level());
    }
}

type Base = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync>;

/// Install the global subscriber
///
/// `RUST_LOG`, when set, replaces the computed filter and the console
/// level. Returns the stats handle for the installed stats layer.
pub fn init(settings: &LoggingSettings, verbosity: u8, debug: bool) -> Result<LogStats> {
    let console = console_level(settings.level, verbosity, debug);
    let env_override = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();

    let files_on = settings.file.enabled || settings.json.enabled;
    let global = if files_on && Level::DEBUG > console {
        Level::DEBUG
    } else {
        console
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = global.as_str().to_ascii_lowercase();
        EnvFilter::new(format!("warn,pcu={level},check_updates_core={level}"))
    });

    let stats = LogStats::new();
    let mut layers: Vec<BoxedLayer> = vec![stats.layer().boxed()];

    if settings.console.enabled {
        let console_filter = if env_override {
            LevelFilter::TRACE
        } else {
            LevelFilter::from_level(console)
        };
        let layer = tracing_fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_file(settings.console.show_path)
            .with_line_number(settings.console.show_path);
        layers.push(if settings.console.show_time {
            layer.with_filter(console_filter).boxed()
        } else {
            layer.without_time().with_filter(console_filter).boxed()
        });
    }

    if settings.file.enabled {
        let file = open_log_file(&settings.log_dir, &format!("{}.log", settings.app_name), &settings.file)?;
        layers.push(
            tracing_fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG)
                .boxed(),
        );
    }

    if settings.json.enabled {
        let file = open_log_file(&settings.log_dir, &format!("{}.json", settings.app_name), &settings.json)?;
        layers.push(
            tracing_fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .context("Failed to install the logger")?;

    Ok(stats)
}

/// Open `{dir}/{name}` for appending after rotation and retention cleanup
fn open_log_file(dir: &Path, name: &str, sink: &FileSettings) -> Result<File> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let path = dir.join(name);

    if let Some(max_bytes) = parse_size(&sink.rotation_size) {
        rotate_if_needed(&path, max_bytes, unix_now())?;
    }
    cleanup_rotated(dir, name, retention(sink.retention_days))?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

fn retention(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(24 * 60 * 60))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Move `path` to `{path}.{timestamp}` when it has grown past `max_bytes`
///
/// Returns the rotated path, if a rotation happened.
pub fn rotate_if_needed(path: &Path, max_bytes: u64, timestamp: u64) -> Result<Option<PathBuf>> {
    let Ok(metadata) = fs::metadata(path) else {
        return Ok(None);
    };
    if metadata.len() <= max_bytes {
        return Ok(None);
    }

    let mut rotated = path.as_os_str().to_owned();
    rotated.push(format!(".{timestamp}"));
    let rotated = PathBuf::from(rotated);
    fs::rename(path, &rotated)
        .with_context(|| format!("Failed to rotate log file {}", path.display()))?;
    Ok(Some(rotated))
}

/// Delete `{name}.{timestamp}` files in `dir` older than `retention`
///
/// Returns how many files were removed.
pub fn cleanup_rotated(dir: &Path, name: &str, retention: Duration) -> Result<usize> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(0);
    };
    let prefix = format!("{name}.");
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(suffix) = file_name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
            continue;
        };
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);
        if expired {
            fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove old log file {}", entry.path().display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Logs how long an operation took when dropped
#[must_use = "the timer logs when it is dropped"]
pub struct OperationTimer {
    name: String,
    started: Instant,
}

impl OperationTimer {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        tracing::debug!(
            operation = %self.name,
            elapsed_ms = elapsed.as_millis(),
            "operation finished"
        );
    }
}
