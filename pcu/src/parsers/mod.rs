pub mod conda;
pub mod lockfiles;
pub mod pipfile;
pub mod pyproject;
pub mod requirements;

pub use conda::CondaParser;
pub use lockfiles::LockfileParser;
pub use pipfile::PipfileParser;
pub use pyproject::PyProjectParser;
pub use requirements::RequirementsParser;

// Re-export Dependency from core for use by parsers
pub use check_updates_core::Dependency;

use crate::detector::PackageManager;
use check_updates_core::VersionSpec;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Trait for dependency file parsers
pub trait DependencyParser: Send + Sync {
    /// Parse a file and return all dependencies found
    fn parse(&self, path: &Path) -> anyhow::Result<Vec<Dependency>>;

    /// Check if this parser can handle the given file
    fn can_parse(&self, path: &Path) -> bool;
}

/// The parser for a detected manifest
pub fn parser_for(pm: PackageManager) -> Box<dyn DependencyParser> {
    match pm {
        PackageManager::Pip => Box::new(RequirementsParser::new()),
        PackageManager::Uv | PackageManager::Poetry | PackageManager::Pdm => {
            Box::new(PyProjectParser::new())
        }
        PackageManager::Conda => Box::new(CondaParser::new()),
        PackageManager::Pipenv => Box::new(PipfileParser::new()),
    }
}

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").unwrap_or_else(|e| panic!("valid pattern: {e}")));

/// name, optional [extras], then whatever constraint text follows
static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(.*?)\s*$")
        .unwrap_or_else(|e| panic!("valid pattern: {e}"))
});

/// PEP 503 normalization: lowercase, runs of `-`, `_`, `.` become `-`
pub fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS
        .replace_all(&name.trim().to_lowercase(), "-")
        .into_owned()
}

/// A PEP 508 requirement reduced to what the checker needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Normalized package name
    pub name: String,
    /// Constraint text as written (no markers, no extras)
    pub raw_spec: String,
    pub spec: VersionSpec,
}

/// Parse a requirement string such as `requests[socks]>=2.28; python_version>'3.8'`
///
/// Direct references (`name @ url`, VCS and archive URLs) return None.
pub fn parse_requirement(text: &str) -> Option<Requirement> {
    let text = text.split(';').next()?.trim();
    if text.is_empty() || text.contains("://") || text.contains('@') {
        return None;
    }

    let caps = REQUIREMENT_RE.captures(text)?;
    let name = caps.get(1)?.as_str();
    let mut raw = caps.get(2).map_or("", |m| m.as_str());

    // PEP 508 allows the legacy `name (>=1.0)` form
    if let Some(inner) = raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        raw = inner.trim();
    }

    if !raw.is_empty() && !raw.starts_with(['=', '<', '>', '!', '~', '^', '*']) {
        return None;
    }

    let spec = VersionSpec::parse(raw).unwrap_or_else(|_| VersionSpec::Complex(raw.to_string()));

    Some(Requirement {
        name: normalize_name(name),
        raw_spec: raw.to_string(),
        spec,
    })
}

/// First line containing `needle`, as (1-indexed number, line text)
pub(crate) fn find_line<'a>(content: &'a str, needle: &str) -> Option<(usize, &'a str)> {
    content
        .lines()
        .enumerate()
        .find(|(_, line)| line.contains(needle))
        .map(|(i, line)| (i + 1, line))
}

/// Line of `key = ...` under the `[section]` header
pub(crate) fn find_key_line<'a>(content: &'a str, section: &str, key: &str) -> Option<(usize, &'a str)> {
    let header = format!("[{section}]");
    let mut in_section = false;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_section = trimmed == header;
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((lhs, _)) = trimmed.split_once('=') else {
            continue;
        };
        let lhs = lhs.trim().trim_matches(['"', '\'']);
        if lhs == key {
            return Some((i + 1, line));
        }
    }
    None
}
