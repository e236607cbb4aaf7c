use crate::version::{Version, VersionSpec};
use std::path::PathBuf;

/// A dependency as parsed from a manifest file
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Package name (PEP 503 normalized)
    pub name: String,
    /// Version specification as parsed
    pub version_spec: VersionSpec,
    /// The specifier text exactly as written in the file
    pub raw_spec: String,
    /// Source file this dependency was found in
    pub source_file: PathBuf,
    /// Line number in the source file (1-indexed)
    pub line_number: usize,
    /// Original line text (for updating)
    pub original_line: String,
}

impl Dependency {
    pub fn new(
        name: impl Into<String>,
        raw_spec: impl Into<String>,
        version_spec: VersionSpec,
        source_file: impl Into<PathBuf>,
        line_number: usize,
        original_line: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version_spec,
            raw_spec: raw_spec.into(),
            source_file: source_file.into(),
            line_number,
            original_line: original_line.into(),
        }
    }
}

/// Package information from a registry
#[derive(Debug, Clone)]
pub struct PackageInfo {
    /// Package name
    pub name: String,
    /// Available versions, sorted ascending
    pub versions: Vec<Version>,
    /// Latest version (may include pre-releases based on settings)
    pub latest: Version,
    /// Latest stable version (no pre-release)
    pub latest_stable: Option<Version>,
}

impl PackageInfo {
    /// Build from an unsorted list; returns None when it's empty
    pub fn from_versions(name: impl Into<String>, mut versions: Vec<Version>) -> Option<Self> {
        versions.sort();
        versions.dedup();
        let latest = versions.last()?.clone();
        let latest_stable = versions.iter().rev().find(|v| !v.is_prerelease()).cloned();
        Some(Self {
            name: name.into(),
            versions,
            latest,
            latest_stable,
        })
    }
}

/// Severity of an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UpdateSeverity {
    Patch,
    Minor,
    Major,
}

impl UpdateSeverity {
    /// Classify the step from one version to a newer one
    pub fn between(from: &Version, to: &Version) -> Self {
        if from.major != to.major {
            UpdateSeverity::Major
        } else if from.minor != to.minor {
            UpdateSeverity::Minor
        } else {
            UpdateSeverity::Patch
        }
    }
}

/// Result of checking a dependency for updates
#[derive(Debug, Clone)]
pub struct DependencyCheck {
    /// The original dependency
    pub dependency: Dependency,
    /// Currently installed version (from lock file)
    pub installed: Option<Version>,
    /// Latest version within the constraint
    pub in_range: Option<Version>,
    /// Absolute latest version
    pub latest: Version,
    /// The version an update would move to
    pub target: Option<Version>,
    /// The VersionSpec to write when updating to target
    pub target_spec: Option<VersionSpec>,
    /// The severity of the update (current → target)
    pub severity: Option<UpdateSeverity>,
    /// The VersionSpec to write when force updating to latest
    pub force_spec: Option<VersionSpec>,
}

impl DependencyCheck {
    /// Check if this dependency has any update available
    pub fn has_update(&self) -> bool {
        self.target.is_some()
    }

    /// Check if there's a newer version available beyond the target
    pub fn has_newer_available(&self) -> bool {
        self.target
            .as_ref()
            .is_some_and(|target| self.latest > *target)
    }

    /// Get the current version (installed or from spec)
    pub fn current_version(&self) -> Option<&Version> {
        self.installed
            .as_ref()
            .or_else(|| self.dependency.version_spec.base_version())
    }
}
