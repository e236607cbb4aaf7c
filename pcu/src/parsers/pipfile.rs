use super::{Dependency, DependencyParser, find_key_line, normalize_name};
use anyhow::{Context, Result};
use check_updates_core::VersionSpec;
use std::fs;
use std::path::Path;
use toml::Value;

/// Parser for pipenv Pipfiles
#[derive(Debug, Default)]
pub struct PipfileParser;

impl PipfileParser {
    pub fn new() -> Self {
        Self
    }
}

impl DependencyParser for PipfileParser {
    fn parse(&self, path: &Path) -> Result<Vec<Dependency>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let doc: toml::Table = content
            .parse()
            .with_context(|| format!("Failed to parse TOML: {}", path.display()))?;

        let mut dependencies: Vec<Dependency> = Vec::new();

        for section in ["packages", "dev-packages"] {
            let Some(table) = doc.get(section).and_then(Value::as_table) else {
                continue;
            };
            for (key, entry) in table {
                let raw = match entry {
                    Value::String(s) => s.as_str(),
                    Value::Table(t) => match t.get("version").and_then(Value::as_str) {
                        Some(version) => version,
                        None => continue,
                    },
                    _ => continue,
                };
                let name = normalize_name(key);
                if dependencies.iter().any(|d| d.name == name) {
                    continue;
                }

                let spec = VersionSpec::parse(raw)
                    .unwrap_or_else(|_| VersionSpec::Complex(raw.to_string()));
                let (line_number, line) = find_key_line(&content, section, key)
                    .map_or((0, format!("{key} = \"{raw}\"")), |(n, l)| (n, l.to_string()));

                dependencies.push(Dependency::new(name, raw, spec, path, line_number, line));
            }
        }

        Ok(dependencies)
    }

    fn can_parse(&self, path: &Path) -> bool {
        path.file_name().and_then(|n| n.to_str()) == Some("Pipfile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_pipfile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Pipfile");
        fs::write(
            &path,
            r#"[[source]]
url = "https://pypi.org/simple"
name = "pypi"

[packages]
requests = "*"
Django = ">=4.2"
flask = {version = "==2.3.0", extras = ["async"]}
local = {path = "."}

[dev-packages]
pytest = "~=7.4"
"#,
        )
        .unwrap();

        let deps = PipfileParser::new().parse(&path).unwrap();
        let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["django", "flask", "requests", "pytest"]);

        let requests = deps.iter().find(|d| d.name == "requests").unwrap();
        assert!(matches!(requests.version_spec, VersionSpec::Any));
        assert_eq!(requests.line_number, 6);

        let flask = deps.iter().find(|d| d.name == "flask").unwrap();
        assert_eq!(flask.raw_spec, "==2.3.0");
        assert_eq!(flask.line_number, 8);

        let pytest = deps.iter().find(|d| d.name == "pytest").unwrap();
        assert!(matches!(pytest.version_spec, VersionSpec::Compatible(_)));
        assert_eq!(pytest.line_number, 12);
    }

    #[test]
    fn test_can_parse() {
        assert!(PipfileParser::new().can_parse(Path::new("/p/Pipfile")));
        assert!(!PipfileParser::new().can_parse(Path::new("Pipfile.lock")));
    }
}
