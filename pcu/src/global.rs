use crate::parsers::normalize_name;
use anyhow::Result;
use check_updates_core::{PackageInfo, UpdateSeverity, Version};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

/// Runs external tools and hands back their stdout
pub trait CommandRunner: Send + Sync {
    /// stdout of a successful run, None if the tool is missing or failed
    fn run(&self, program: &str, args: &[&str]) -> Option<String>;
}

/// Runs commands on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Option<String> {
        let output = Command::new(program).args(args).output().ok()?;
        if !output.status.success() {
            tracing::debug!(program, ?args, status = %output.status, "command failed");
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Source of a globally installed package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlobalSource {
    Uv,
    Pipx,
    PipUser,
}

impl GlobalSource {
    pub const ALL: [GlobalSource; 3] = [GlobalSource::Uv, GlobalSource::Pipx, GlobalSource::PipUser];
}

impl std::fmt::Display for GlobalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlobalSource::Uv => write!(f, "uv"),
            GlobalSource::Pipx => write!(f, "pipx"),
            GlobalSource::PipUser => write!(f, "pip"),
        }
    }
}

/// A globally installed package
#[derive(Debug, Clone)]
pub struct GlobalPackage {
    pub name: String,
    pub installed_version: Version,
    pub source: GlobalSource,
    /// Python version (only set for pip --user packages)
    pub python_version: Option<String>,
}

/// Result of checking a global package
#[derive(Debug, Clone)]
pub struct GlobalCheck {
    pub package: GlobalPackage,
    pub latest: Version,
    pub has_update: bool,
}

impl GlobalCheck {
    /// Compare an installed package against the registry
    ///
    /// With `same_major_only`, the target is the newest release in the
    /// installed major series.
    pub fn new(package: GlobalPackage, info: &PackageInfo, same_major_only: bool) -> Self {
        let installed = &package.installed_version;
        let latest = if same_major_only {
            info.versions
                .iter()
                .rev()
                .find(|v| v.major == installed.major)
                .unwrap_or(installed)
                .clone()
        } else {
            info.latest.clone()
        };
        let has_update = latest > *installed;
        Self {
            package,
            latest,
            has_update,
        }
    }

    /// Get update severity for coloring
    pub fn update_severity(&self) -> Option<UpdateSeverity> {
        self.has_update
            .then(|| UpdateSeverity::between(&self.package.installed_version, &self.latest))
    }
}

/// Discovers globally installed packages from uv, pipx and pip --user
pub struct GlobalPackageDiscovery<R: CommandRunner = SystemRunner> {
    runner: R,
    home: Option<PathBuf>,
}

impl GlobalPackageDiscovery<SystemRunner> {
    pub fn new() -> Self {
        Self::with_runner(SystemRunner, dirs::home_dir())
    }
}

impl Default for GlobalPackageDiscovery<SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> GlobalPackageDiscovery<R> {
    pub fn with_runner(runner: R, home: Option<PathBuf>) -> Self {
        Self { runner, home }
    }

    /// Discover all globally installed packages; unavailable sources are skipped
    pub fn discover(&self) -> Vec<GlobalPackage> {
        GlobalSource::ALL
            .iter()
            .flat_map(|&source| match self.probe(source) {
                Ok(found) => {
                    tracing::debug!(%source, count = found.len(), "probed global source");
                    found
                }
                Err(e) => {
                    tracing::debug!(%source, error = %e, "global source unavailable");
                    Vec::new()
                }
            })
            .collect()
    }

    /// Packages from a single source
    pub fn probe(&self, source: GlobalSource) -> Result<Vec<GlobalPackage>> {
        match source {
            GlobalSource::Uv => Ok(self
                .runner
                .run("uv", &["tool", "list"])
                .map(|out| parse_uv_tool_list(&out))
                .unwrap_or_default()),
            GlobalSource::Pipx => match self.runner.run("pipx", &["list", "--json"]) {
                Some(json) => parse_pipx_json(&json),
                None => self.pipx_from_directory(),
            },
            GlobalSource::PipUser => self.pip_user_packages(),
        }
    }

    /// Fallback when pipx itself is missing: scan ~/.local/pipx/venvs
    fn pipx_from_directory(&self) -> Result<Vec<GlobalPackage>> {
        let Some(venvs) = self
            .home
            .as_ref()
            .map(|h| h.join(".local/pipx/venvs"))
            .filter(|p| p.is_dir())
        else {
            return Ok(Vec::new());
        };

        let mut packages = Vec::new();
        for entry in fs::read_dir(&venvs)?.flatten() {
            let venv = entry.path();
            if !venv.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(version) = venv_package_version(&venv, &name) {
                packages.push(GlobalPackage {
                    name,
                    installed_version: version,
                    source: GlobalSource::Pipx,
                    python_version: None,
                });
            }
        }
        Ok(packages)
    }

    /// ~/.local/lib/pythonX.Y/site-packages, newest interpreter first
    fn pip_user_packages(&self) -> Result<Vec<GlobalPackage>> {
        let Some(user_lib) = self
            .home
            .as_ref()
            .map(|h| h.join(".local/lib"))
            .filter(|p| p.is_dir())
        else {
            return Ok(Vec::new());
        };

        let mut python_dirs: Vec<(Version, String, PathBuf)> = fs::read_dir(&user_lib)?
            .flatten()
            .filter_map(|entry| {
                let dir_name = entry.file_name().to_string_lossy().into_owned();
                let series = dir_name.strip_prefix("python")?.to_string();
                let version = Version::from_str(&series).ok()?;
                Some((version, series, entry.path().join("site-packages")))
            })
            .collect();
        python_dirs.sort_by(|a, b| b.0.cmp(&a.0));

        let mut seen = HashSet::new();
        let mut packages = Vec::new();
        for (_, series, site_packages) in python_dirs {
            let Ok(entries) = fs::read_dir(&site_packages) else {
                continue;
            };
            let mut found: Vec<(String, Version)> = entries
                .flatten()
                .filter_map(|e| parse_dist_info_name(&e.file_name().to_string_lossy()))
                .collect();
            found.sort_by(|a, b| a.0.cmp(&b.0));

            for (name, version) in found {
                if !seen.insert(normalize_name(&name)) {
                    continue;
                }
                packages.push(GlobalPackage {
                    name,
                    installed_version: version,
                    source: GlobalSource::PipUser,
                    python_version: Some(series.clone()),
                });
            }
        }
        Ok(packages)
    }

    /// Whether `pythonX.Y` is on PATH
    pub fn is_python_available(&self, series: &str) -> bool {
        self.runner
            .run(&format!("python{series}"), &["--version"])
            .is_some()
    }

    /// Upgrade commands for every source with updates
    pub fn upgrade_commands(&self, checks: &[GlobalCheck]) -> Vec<UpgradeCommand> {
        let by_source = group_by_source(checks);
        let mut commands = Vec::new();

        if by_source.contains_key(&GlobalSource::Uv) {
            commands.push(UpgradeCommand::Command("uv tool upgrade --all".to_string()));
        }
        if by_source.contains_key(&GlobalSource::Pipx) {
            commands.push(UpgradeCommand::Command("pipx upgrade-all".to_string()));
        }

        let mut by_python: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for check in by_source.get(&GlobalSource::PipUser).into_iter().flatten() {
            by_python
                .entry(check.package.python_version.as_deref().unwrap_or("3"))
                .or_default()
                .push(check.package.name.as_str());
        }

        for (series, names) in by_python {
            if self.is_python_available(series) {
                commands.push(UpgradeCommand::Command(format!(
                    "python{series} -m pip install --user --upgrade {}",
                    names.join(" ")
                )));
            } else {
                let path = self.home.as_ref().map_or_else(
                    || format!("~/.local/lib/python{series}"),
                    |h| h.join(format!(".local/lib/python{series}")).display().to_string(),
                );
                commands.push(UpgradeCommand::Comment(format!(
                    "Python {series} is no longer installed. Consider removing {path} if nothing uses it."
                )));
            }
        }

        commands
    }
}

/// Parse output of `uv tool list`
///
/// Tool lines look like `ruff v0.14.10`; indented `- entrypoint` lines are skipped.
pub fn parse_uv_tool_list(output: &str) -> Vec<GlobalPackage> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let version = Version::from_str(parts.next()?).ok()?;
            Some(GlobalPackage {
                name: name.to_string(),
                installed_version: version,
                source: GlobalSource::Uv,
                python_version: None,
            })
        })
        .collect()
}

/// Parse `pipx list --json`
pub fn parse_pipx_json(json: &str) -> Result<Vec<GlobalPackage>> {
    let data: serde_json::Value = serde_json::from_str(json)?;
    let mut packages: Vec<GlobalPackage> = data
        .get("venvs")
        .and_then(serde_json::Value::as_object)
        .into_iter()
        .flatten()
        .filter_map(|(name, venv)| {
            let version = venv
                .pointer("/metadata/main_package/package_version")
                .and_then(serde_json::Value::as_str)?;
            Some(GlobalPackage {
                name: name.clone(),
                installed_version: Version::from_str(version).ok()?,
                source: GlobalSource::Pipx,
                python_version: None,
            })
        })
        .collect();
    packages.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(packages)
}

/// Split `package_name-1.2.3.dist-info` into name and version
pub fn parse_dist_info_name(name: &str) -> Option<(String, Version)> {
    let stem = name.strip_suffix(".dist-info")?;
    let (pkg, version) = stem
        .char_indices()
        .rev()
        .filter(|&(_, c)| c == '-')
        .map(|(i, _)| (&stem[..i], &stem[i + 1..]))
        .find(|(_, rest)| rest.starts_with(|c: char| c.is_ascii_digit()))?;
    Some((pkg.to_string(), Version::from_str(version).ok()?))
}

/// Version of the venv's main package, read from its dist-info
fn venv_package_version(venv: &Path, package: &str) -> Option<Version> {
    let lib = venv.join("lib");
    let python_dir = fs::read_dir(&lib)
        .ok()?
        .flatten()
        .find(|e| e.file_name().to_string_lossy().starts_with("python"))?;
    let wanted = normalize_name(package);

    fs::read_dir(python_dir.path().join("site-packages"))
        .ok()?
        .flatten()
        .filter_map(|e| parse_dist_info_name(&e.file_name().to_string_lossy()))
        .find(|(name, _)| normalize_name(name) == wanted)
        .map(|(_, version)| version)
}

/// Group checks with updates by source
pub fn group_by_source(checks: &[GlobalCheck]) -> HashMap<GlobalSource, Vec<&GlobalCheck>> {
    let mut grouped: HashMap<GlobalSource, Vec<&GlobalCheck>> = HashMap::new();
    for check in checks.iter().filter(|c| c.has_update) {
        grouped.entry(check.package.source).or_default().push(check);
    }
    grouped
}

/// An upgrade command or a comment (for unavailable Python versions)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeCommand {
    /// A shell command to run
    Command(String),
    /// A comment (Python version not available)
    Comment(String),
}

impl std::fmt::Display for UpgradeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradeCommand::Command(cmd) => write!(f, "{cmd}"),
            UpgradeCommand::Comment(text) => write!(f, "# {text}"),
        }
    }
}
