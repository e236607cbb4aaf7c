use crate::global::{CommandRunner, UpgradeCommand};
use anyhow::{Context, Result};
use check_updates_core::Version;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENDOFLIFE_URL: &str = "https://endoflife.date/api";

/// Information about the Python environment
#[derive(Debug, Clone)]
pub struct PythonInfo {
    /// Current Python version
    pub current: Version,
    /// Latest available Python version
    pub latest: Option<Version>,
}

impl PythonInfo {
    /// Check if an update is available
    pub fn has_update(&self) -> bool {
        self.latest.as_ref().is_some_and(|latest| *latest > self.current)
    }
}

/// Detect the version of `python3` (or `python`) on PATH
pub fn detect_python_version(runner: &dyn CommandRunner) -> Option<Version> {
    ["python3", "python"].iter().find_map(|cmd| {
        let output = runner.run(cmd, &["--version"])?;
        // "Python 3.11.5"
        Version::from_str(output.trim().strip_prefix("Python ")?).ok()
    })
}

/// Latest patch release per 3.x series
#[derive(Debug, Clone, Default)]
pub struct PythonReleases {
    /// "3.12" -> 3.12.7
    pub latest_by_series: HashMap<String, Version>,
}

impl PythonReleases {
    /// The newest release across all series
    pub fn latest(&self) -> Option<&Version> {
        self.latest_by_series.values().max()
    }

    pub fn latest_in_series(&self, series: &str) -> Option<&Version> {
        self.latest_by_series.get(series)
    }
}

/// Release cycle entry from endoflife.date
#[derive(Debug, Deserialize)]
struct PythonCycle {
    cycle: String,
    latest: String,
}

/// Client for the endoflife.date Python release data
#[derive(Debug, Clone)]
pub struct EndOfLifeClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for EndOfLifeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EndOfLifeClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: ENDOFLIFE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch the Python release cycles
    pub async fn fetch(&self) -> Result<PythonReleases> {
        let url = format!("{}/python.json", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch Python release data")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch Python release data: {}", response.status());
        }

        let cycles: Vec<PythonCycle> = response
            .json()
            .await
            .context("Failed to parse Python release data")?;

        let latest_by_series = cycles
            .into_iter()
            .filter(|c| c.cycle.starts_with("3."))
            .filter_map(|c| Some((c.cycle, Version::from_str(&c.latest).ok()?)))
            .collect();

        Ok(PythonReleases { latest_by_series })
    }
}

/// An interpreter reported by `uv python list`
#[derive(Debug, Clone)]
pub struct UvPythonInfo {
    /// e.g. "cpython-3.11.5-linux-x86_64-gnu"
    pub full_name: String,
    pub version: Version,
    /// Installation path; None when only a download is available
    pub path: Option<PathBuf>,
}

impl UvPythonInfo {
    pub fn is_installed(&self) -> bool {
        self.path.is_some()
    }

    pub fn series(&self) -> String {
        format!("{}.{}", self.version.major, self.version.minor)
    }
}

/// Result of checking a Python series for updates
#[derive(Debug, Clone)]
pub struct UvPythonCheck {
    /// The major.minor series (e.g., "3.11")
    pub series: String,
    pub installed_version: Version,
    pub latest_version: Version,
    pub has_update: bool,
}

impl UvPythonCheck {
    pub fn is_patch_update(&self) -> bool {
        self.has_update && self.latest_version.same_minor(&self.installed_version)
    }
}

/// Parse `uv python list` output
///
/// Only CPython builds are kept; freethreaded variants and other
/// implementations are skipped.
pub fn parse_uv_python_list(output: &str) -> Vec<UvPythonInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let full_name = parts.next()?;
            let location = parts.next();

            if full_name.contains("+freethreaded") {
                return None;
            }
            let mut name_parts = full_name.split('-');
            if name_parts.next()? != "cpython" {
                return None;
            }
            let version = Version::from_str(name_parts.next()?).ok()?;

            let path = location
                .filter(|loc| !loc.starts_with('<'))
                .map(PathBuf::from);

            Some(UvPythonInfo {
                full_name: full_name.to_string(),
                version,
                path,
            })
        })
        .collect()
}

/// One check per installed series, against the latest patch of that series
pub fn check_uv_pythons(pythons: &[UvPythonInfo], releases: &PythonReleases) -> Vec<UvPythonCheck> {
    let mut newest: BTreeMap<String, &Version> = BTreeMap::new();
    for python in pythons.iter().filter(|p| p.is_installed()) {
        let entry = newest.entry(python.series()).or_insert(&python.version);
        if python.version > **entry {
            *entry = &python.version;
        }
    }

    newest
        .into_iter()
        .filter_map(|(series, installed)| {
            let latest = releases.latest_in_series(&series)?;
            Some(UvPythonCheck {
                has_update: latest > installed,
                series,
                installed_version: installed.clone(),
                latest_version: latest.clone(),
            })
        })
        .collect()
}

/// Check uv-managed interpreters; empty when uv is not available
pub fn discover_uv_pythons(runner: &dyn CommandRunner, releases: &PythonReleases) -> Vec<UvPythonCheck> {
    match runner.run("uv", &["python", "list"]) {
        Some(output) => check_uv_pythons(&parse_uv_python_list(&output), releases),
        None => Vec::new(),
    }
}

/// `uv python install X.Y.Z` for each outdated series
pub fn uv_python_upgrade_commands(checks: &[UvPythonCheck]) -> Vec<UpgradeCommand> {
    checks
        .iter()
        .filter(|c| c.has_update)
        .map(|c| UpgradeCommand::Command(format!("uv python install {}", c.latest_version)))
        .collect()
}
