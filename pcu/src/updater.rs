use crate::detector::{PackageManager, ProjectDetector};
use anyhow::{Context, Result};
use check_updates_core::{DependencyCheck, UpdateSeverity};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Rewrites dependency files in place with new constraints
#[derive(Debug, Default)]
pub struct FileUpdater;

/// A single planned edit
struct LineEdit<'a> {
    check: &'a DependencyCheck,
    new_spec: String,
}

impl FileUpdater {
    pub fn new() -> Self {
        Self
    }

    /// Apply updates to dependency files
    ///
    /// By default only patch updates are written; `include_minor` adds minor
    /// ones and `force` writes the latest-version constraint for everything.
    pub fn apply_updates(
        &self,
        checks: &[DependencyCheck],
        include_minor: bool,
        force: bool,
    ) -> Result<UpdateResult> {
        let mut by_file: BTreeMap<PathBuf, Vec<LineEdit<'_>>> = BTreeMap::new();

        for check in checks {
            let spec = if force {
                check.force_spec.as_ref()
            } else {
                match check.severity {
                    Some(UpdateSeverity::Patch) => check.target_spec.as_ref(),
                    Some(UpdateSeverity::Minor) if include_minor => check.target_spec.as_ref(),
                    _ => None,
                }
            };
            if let Some(spec) = spec {
                by_file
                    .entry(check.dependency.source_file.clone())
                    .or_default()
                    .push(LineEdit {
                        check,
                        new_spec: spec.to_string(),
                    });
            }
        }

        let mut result = UpdateResult::default();
        let mut files_per_package: BTreeMap<&str, BTreeSet<&Path>> = BTreeMap::new();

        for (path, edits) in &by_file {
            let applied = self
                .update_file(path, edits)
                .with_context(|| format!("Failed to update file: {}", path.display()))?;
            if applied.is_empty() {
                continue;
            }

            for name in applied {
                files_per_package.entry(name).or_default().insert(path);
            }
            result.modified_files.insert(path.clone());

            if let Some(pm) = manager_for(path) {
                let command = pm.sync_command(path);
                if !result.sync_commands.contains(&command) {
                    result.sync_commands.push(command);
                }
            }
        }

        result.multi_file_packages = files_per_package
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(name, _)| name.to_string())
            .collect();

        Ok(result)
    }

    /// Rewrite the recorded lines of one file; returns the names updated
    fn update_file<'a>(&self, path: &Path, edits: &[LineEdit<'a>]) -> Result<Vec<&'a str>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let conda = is_conda_file(path);

        // split_inclusive keeps each line's own terminator (\n or \r\n)
        let mut lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();
        let mut applied = Vec::new();

        for edit in edits {
            let dependency = &edit.check.dependency;
            let Some(line) = dependency
                .line_number
                .checked_sub(1)
                .and_then(|idx| lines.get_mut(idx))
            else {
                tracing::warn!(package = %dependency.name, file = %path.display(), "no recorded line to update");
                continue;
            };

            let new_spec = if conda {
                conda_spec(&dependency.raw_spec, &edit.new_spec)
            } else {
                edit.new_spec.clone()
            };

            match replace_spec(line, &dependency.name, &dependency.raw_spec, &new_spec) {
                Some(updated) => {
                    tracing::debug!(package = %dependency.name, from = %dependency.raw_spec, to = %new_spec, "updating");
                    *line = updated;
                    applied.push(dependency.name.as_str());
                }
                None => {
                    tracing::warn!(
                        package = %dependency.name,
                        file = %path.display(),
                        line = dependency.line_number,
                        "constraint text not found on its line, skipping"
                    );
                }
            }
        }

        if !applied.is_empty() {
            fs::write(path, lines.concat())
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
        }
        Ok(applied)
    }
}

/// Replace the first `raw_spec` that follows the package name in `line`
fn replace_spec(line: &str, name: &str, raw_spec: &str, new_spec: &str) -> Option<String> {
    if raw_spec.is_empty() {
        return None;
    }
    let lower = line.to_ascii_lowercase();
    let offset = [name.to_string(), name.replace('-', "_"), name.replace('-', ".")]
        .iter()
        .find_map(|candidate| find_name(&lower, candidate))
        .unwrap_or(0);

    let start = offset + line[offset..].find(raw_spec)?;
    let end = start + raw_spec.len();
    Some(format!("{}{new_spec}{}", &line[..start], &line[end..]))
}

/// End of the first whole-name occurrence of `name` in `line`
///
/// `flask` must not match inside `flask-cors` or `pytest-flask`.
fn find_name(line: &str, name: &str) -> Option<usize> {
    let is_name_byte = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-');
    let bytes = line.as_bytes();
    line.match_indices(name).map(|(i, _)| (i, i + name.len())).find_map(|(start, end)| {
        let before = start.checked_sub(1).and_then(|i| bytes.get(i)).copied();
        let after = bytes.get(end).copied();
        (!before.is_some_and(is_name_byte) && !after.is_some_and(is_name_byte)).then_some(end)
    })
}

/// Conda pins with a single `=`; keep that style when the file used it
fn conda_spec(raw_spec: &str, new_spec: &str) -> String {
    let single_eq = raw_spec.starts_with('=') && !raw_spec.starts_with("==");
    match new_spec.strip_prefix("==") {
        Some(rest) if single_eq => format!("={rest}"),
        _ => new_spec.to_string(),
    }
}

fn is_conda_file(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some("environment.yml" | "environment.yaml")
    )
}

/// Package manager that owns a manifest, for the sync hint
fn manager_for(path: &Path) -> Option<PackageManager> {
    let file_name = path.file_name()?.to_str()?;
    match file_name {
        "pyproject.toml" => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            ProjectDetector::new(dir).pyproject_manager(path).ok().flatten()
        }
        "environment.yml" | "environment.yaml" => Some(PackageManager::Conda),
        "Pipfile" => Some(PackageManager::Pipenv),
        name if name.starts_with("requirements") => Some(PackageManager::Pip),
        _ => None,
    }
}

/// Result of applying updates
#[derive(Debug, Default)]
pub struct UpdateResult {
    /// Files that were modified
    pub modified_files: BTreeSet<PathBuf>,
    /// Packages that were updated in more than one file
    pub multi_file_packages: Vec<String>,
    /// Commands to run so lock files/environments catch up
    pub sync_commands: Vec<String>,
}

impl UpdateResult {
    /// Print post-update messages
    pub fn print_summary(&self) -> io::Result<()> {
        let stdout = io::stdout();
        self.write_summary(&mut stdout.lock())
    }

    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for file in &self.modified_files {
            writeln!(out, "Updated {}", file.display())?;
        }

        if !self.multi_file_packages.is_empty() {
            writeln!(
                out,
                "\nNote: The following packages were updated in multiple files: {}",
                self.multi_file_packages.join(", ")
            )?;
        }

        if !self.sync_commands.is_empty() {
            writeln!(out, "\nRun to sync:")?;
            for command in &self.sync_commands {
                writeln!(out, "  {command}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{CondaParser, DependencyParser, PyProjectParser, RequirementsParser};
    use check_updates_core::{DependencyResolver, PackageInfo, Version};
    use std::str::FromStr;
    use tempfile::TempDir;

    fn info(name: &str, versions: &[&str]) -> PackageInfo {
        PackageInfo::from_versions(
            name,
            versions.iter().map(|s| Version::from_str(s).unwrap()).collect(),
        )
        .unwrap()
    }

    /// Parse a file and resolve each dependency against the given registry data
    fn checks(
        parser: &dyn DependencyParser,
        path: &Path,
        registry: &[(&str, &[&str])],
    ) -> Vec<DependencyCheck> {
        let resolver = DependencyResolver::new();
        parser
            .parse(path)
            .unwrap()
            .iter()
            .filter_map(|dep| {
                let (_, versions) = registry.iter().find(|(n, _)| *n == dep.name)?;
                Some(resolver.resolve(dep, &info(&dep.name, versions), None))
            })
            .collect()
    }

    const REGISTRY: &[(&str, &[&str])] = &[
        ("requests", &["2.28.0", "2.28.2", "2.32.3", "3.0.0"]),
        ("flask", &["2.0.0", "2.0.3", "2.3.3"]),
        ("numpy", &["1.24.0", "1.26.4", "2.1.0"]),
    ];

    #[test]
    fn test_patch_only_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "requests==2.28.0\nflask==2.0.0  # web\n").unwrap();

        let checks = checks(&RequirementsParser::new(), &path, REGISTRY);
        let result = FileUpdater::new().apply_updates(&checks, false, false).unwrap();

        // requests 2.28.0 -> 2.32.3 is minor, flask 2.0.0 -> 2.3.3 is minor
        assert!(result.modified_files.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "requests==2.28.0\nflask==2.0.0  # web\n");
    }

    #[test]
    fn test_minor_updates_preserve_formatting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "requests[socks] == 2.28.0 ; python_version >= '3.8'\r\nflask==2.0.0  # web\r\n").unwrap();

        let checks = checks(&RequirementsParser::new(), &path, REGISTRY);
        let result = FileUpdater::new().apply_updates(&checks, true, false).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "requests[socks] ==2.32.3 ; python_version >= '3.8'\r\nflask==2.3.3  # web\r\n"
        );
        assert_eq!(result.sync_commands, ["pip install -r requirements.txt"]);
    }

    #[test]
    fn test_force_writes_latest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "requests>=2.28.0,<3.0.0\nnumpy==1.26.4").unwrap();

        let checks = checks(&RequirementsParser::new(), &path, REGISTRY);
        FileUpdater::new().apply_updates(&checks, false, true).unwrap();

        // No trailing newline stays no trailing newline
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "requests>=3.0.0,<4.0.0\nnumpy==2.1.0"
        );
    }

    #[test]
    fn test_pyproject_quotes_and_poetry_detection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pyproject.toml");
        fs::write(
            &path,
            "[tool.poetry.dependencies]\npython = \"^3.10\"\nflask = '^2.0.0'\nrequests = {version = \"^2.28.0\", extras = [\"socks\"]}\n",
        )
        .unwrap();

        let checks = checks(&PyProjectParser::new(), &path, REGISTRY);
        let result = FileUpdater::new().apply_updates(&checks, true, false).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[tool.poetry.dependencies]\npython = \"^3.10\"\nflask = '^2.3.3'\nrequests = {version = \"^2.32.3\", extras = [\"socks\"]}\n"
        );
        assert_eq!(result.sync_commands, ["poetry lock"]);
    }

    #[test]
    fn test_conda_keeps_single_equals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("environment.yml");
        fs::write(
            &path,
            "dependencies:\n  - numpy=1.24.0\n  - pip:\n    - requests==2.28.0\n",
        )
        .unwrap();

        let checks = checks(&CondaParser::new(), &path, REGISTRY);
        let result = FileUpdater::new().apply_updates(&checks, true, false).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "dependencies:\n  - numpy=1.26.4\n  - pip:\n    - requests==2.32.3\n"
        );
        assert_eq!(result.sync_commands, ["conda env update"]);
    }

    #[test]
    fn test_multi_file_packages_and_summary() {
        let dir = TempDir::new().unwrap();
        let main = dir.path().join("requirements.txt");
        let dev = dir.path().join("requirements-dev.txt");
        fs::write(&main, "requests==2.28.0\n").unwrap();
        fs::write(&dev, "requests==2.28.0\n").unwrap();

        let mut all = checks(&RequirementsParser::new(), &main, REGISTRY);
        all.extend(checks(&RequirementsParser::new(), &dev, REGISTRY));
        let result = FileUpdater::new().apply_updates(&all, true, false).unwrap();

        assert_eq!(result.modified_files.len(), 2);
        assert_eq!(result.multi_file_packages, ["requests"]);
        assert_eq!(
            result.sync_commands,
            ["pip install -r requirements-dev.txt", "pip install -r requirements.txt"]
        );

        let mut out = Vec::new();
        result.write_summary(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("updated in multiple files: requests"));
        assert!(text.contains("Run to sync:\n  pip install -r requirements-dev.txt\n"));
    }

    #[test]
    fn test_replace_spec_after_name() {
        assert_eq!(
            replace_spec("a==1.0, b==1.0", "b", "==1.0", "==2.0").unwrap(),
            "a==1.0, b==2.0"
        );
        assert_eq!(
            replace_spec("Typing_Extensions>=4.0", "typing-extensions", ">=4.0", ">=4.12").unwrap(),
            "Typing_Extensions>=4.12"
        );
        assert!(replace_spec("requests", "requests", "", "==1").is_none());
    }

    #[test]
    fn test_replace_spec_matches_whole_name() {
        assert_eq!(
            replace_spec(r#"dependencies = ["flask-cors>=2.0", "flask>=2.0"]"#, "flask", ">=2.0", ">=2.3.3")
                .unwrap(),
            r#"dependencies = ["flask-cors>=2.0", "flask>=2.3.3"]"#
        );
        assert_eq!(
            replace_spec("pytest-flask==1.0 flask==1.0", "flask", "==1.0", "==2.0").unwrap(),
            "pytest-flask==1.0 flask==2.0"
        );
    }

    #[test]
    fn test_continued_requirement_is_updated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "requests \\\n    ==2.28.0\n").unwrap();

        let registry: &[(&str, &[&str])] = &[("requests", &["2.28.0", "2.28.2"])];
        let checks = checks(&RequirementsParser::new(), &path, registry);
        assert_eq!(checks[0].severity, Some(UpdateSeverity::Patch));

        let result = FileUpdater::new().apply_updates(&checks, false, false).unwrap();
        assert_eq!(result.modified_files.len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "requests \\\n    ==2.28.2\n");
    }

    #[test]
    fn test_hashed_requirement_is_updated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "requests==2.28.0 \\\n    --hash=sha256:abcdef\n").unwrap();

        let registry: &[(&str, &[&str])] = &[("requests", &["2.28.0", "2.28.2"])];
        let checks = checks(&RequirementsParser::new(), &path, registry);
        FileUpdater::new().apply_updates(&checks, false, false).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "requests==2.28.2 \\\n    --hash=sha256:abcdef\n"
        );
    }

    #[test]
    fn test_conda_spec() {
        assert_eq!(conda_spec("=1.24.0", "==1.26.4"), "=1.26.4");
        assert_eq!(conda_spec("==1.24.0", "==1.26.4"), "==1.26.4");
        assert_eq!(conda_spec("=3.9.*", "==3.12.*"), "=3.12.*");
        assert_eq!(conda_spec(">=1.0", ">=2.0"), ">=2.0");
    }
}
