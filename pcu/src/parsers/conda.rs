use super::{Dependency, DependencyParser, normalize_name, parse_requirement};
use anyhow::{Context, Result};
use check_updates_core::VersionSpec;
use serde_yaml::Value;
use std::fs;
use std::path::Path;

/// Parser for conda environment.yml files
#[derive(Debug, Default)]
pub struct CondaParser;

/// Entries that describe the environment rather than a PyPI package
const SKIPPED: &[&str] = &["python", "pip"];

impl CondaParser {
    pub fn new() -> Self {
        Self
    }

    /// Split a conda match spec into (name, constraint text)
    ///
    /// `numpy=1.24.0=py39_0` drops the build string; channel-qualified
    /// names (`conda-forge::numpy`) are not PyPI packages and return None.
    fn split_conda_spec(entry: &str) -> Option<(&str, &str)> {
        let entry = entry.trim();
        if entry.is_empty() || entry.contains("::") {
            return None;
        }

        let split = entry
            .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | ' '))
            .unwrap_or(entry.len());
        let name = entry[..split].trim();
        let mut raw = entry[split..].trim();

        // Single `=` is the conda pin; a second `=` starts the build string
        if let Some(rest) = raw.strip_prefix('=')
            && !rest.starts_with('=')
            && let Some(build) = rest.find('=')
        {
            raw = &raw[..=build];
        }

        if name.is_empty() {
            None
        } else {
            Some((name, raw))
        }
    }
}

/// Walks the raw text in step with the YAML sequence to recover line numbers
struct LineCursor<'a> {
    lines: Vec<&'a str>,
    next: usize,
}

impl<'a> LineCursor<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            lines: content.lines().collect(),
            next: 0,
        }
    }

    /// Find the `- entry` line at or after the cursor
    fn locate(&mut self, entry: &str) -> Option<(usize, &'a str)> {
        let found = (self.next..self.lines.len()).find(|&i| {
            self.lines[i]
                .trim()
                .strip_prefix('-')
                .map(|item| item.trim().trim_matches(['"', '\'']))
                .is_some_and(|item| item == entry.trim())
        })?;
        self.next = found + 1;
        Some((found + 1, self.lines[found]))
    }
}

impl DependencyParser for CondaParser {
    fn parse(&self, path: &Path) -> Result<Vec<Dependency>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let yaml: Value = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML: {}", path.display()))?;

        let mut cursor = LineCursor::new(&content);
        let mut dependencies = Vec::new();

        let entries = yaml
            .get("dependencies")
            .and_then(Value::as_sequence)
            .into_iter()
            .flatten();

        for entry in entries {
            if let Some(text) = entry.as_str() {
                let location = cursor.locate(text);
                let Some((name, raw)) = Self::split_conda_spec(text) else {
                    continue;
                };
                let name = normalize_name(name);
                if SKIPPED.contains(&name.as_str()) {
                    continue;
                }
                let (line_number, line) = location.unwrap_or((0, text));
                let spec = VersionSpec::parse(raw)
                    .unwrap_or_else(|_| VersionSpec::Complex(raw.to_string()));
                dependencies.push(Dependency::new(name, raw, spec, path, line_number, line));
            } else if let Some(pip) = entry.get("pip").and_then(Value::as_sequence) {
                for pip_entry in pip.iter().filter_map(Value::as_str) {
                    let location = cursor.locate(pip_entry);
                    let Some(requirement) = parse_requirement(pip_entry) else {
                        continue;
                    };
                    let (line_number, line) = location.unwrap_or((0, pip_entry));
                    dependencies.push(Dependency::new(
                        requirement.name,
                        requirement.raw_spec,
                        requirement.spec,
                        path,
                        line_number,
                        line,
                    ));
                }
            }
        }

        tracing::debug!(file = %path.display(), count = dependencies.len(), "parsed conda environment");
        Ok(dependencies)
    }

    fn can_parse(&self, path: &Path) -> bool {
        matches!(
            path.file_name().and_then(|n| n.to_str()),
            Some("environment.yml" | "environment.yaml")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(content: &str) -> Vec<Dependency> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("environment.yml");
        fs::write(&path, content).unwrap();
        CondaParser::new().parse(&path).unwrap()
    }

    #[test]
    fn test_can_parse() {
        let parser = CondaParser::new();
        assert!(parser.can_parse(Path::new("environment.yml")));
        assert!(parser.can_parse(Path::new("environment.yaml")));
        assert!(!parser.can_parse(Path::new("requirements.txt")));
    }

    #[test]
    fn test_split_conda_spec() {
        assert_eq!(CondaParser::split_conda_spec("numpy"), Some(("numpy", "")));
        assert_eq!(CondaParser::split_conda_spec("numpy=1.24.0"), Some(("numpy", "=1.24.0")));
        assert_eq!(
            CondaParser::split_conda_spec("numpy=1.24.0=py39_0"),
            Some(("numpy", "=1.24.0"))
        );
        assert_eq!(CondaParser::split_conda_spec("pandas >=1.5"), Some(("pandas", ">=1.5")));
        assert_eq!(CondaParser::split_conda_spec("conda-forge::numpy"), None);
    }

    #[test]
    fn test_parse_environment_yml() {
        let deps = parse(
            r#"name: myenv
channels:
  - conda-forge
dependencies:
  - python=3.9.*
  - pip
  - numpy=1.24.0
  - pandas>=1.5.0
  - scikit-learn
  - pytorch::pytorch
  - pip:
    - requests==2.28.0
    - "flask>=2.0.0,<3.0.0"
    - django
"#,
        );

        let summary: Vec<(&str, usize)> =
            deps.iter().map(|d| (d.name.as_str(), d.line_number)).collect();
        assert_eq!(
            summary,
            [
                ("numpy", 7),
                ("pandas", 8),
                ("scikit-learn", 9),
                ("requests", 12),
                ("flask", 13),
                ("django", 14),
            ]
        );

        assert!(matches!(deps[0].version_spec, VersionSpec::Pinned(_)));
        assert_eq!(deps[0].raw_spec, "=1.24.0");
        assert_eq!(deps[0].original_line, "  - numpy=1.24.0");
        assert!(matches!(deps[1].version_spec, VersionSpec::Minimum(_)));
        assert!(matches!(deps[2].version_spec, VersionSpec::Any));
        assert!(matches!(deps[4].version_spec, VersionSpec::Range { .. }));
    }

    #[test]
    fn test_empty_dependencies() {
        assert!(parse("name: myenv\ndependencies: []\n").is_empty());
        assert!(parse("name: myenv\n").is_empty());
    }
}
