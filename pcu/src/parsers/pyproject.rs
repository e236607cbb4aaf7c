use super::{
    Dependency, DependencyParser, find_key_line, find_line, normalize_name, parse_requirement,
};
use anyhow::{Context, Result};
use check_updates_core::VersionSpec;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use toml::Value;

/// Parser for pyproject.toml files (PEP 621, PEP 735, Poetry, PDM)
#[derive(Debug, Default)]
pub struct PyProjectParser;

/// Parsing state for one file
struct PyProjectDocument<'a> {
    path: &'a Path,
    content: &'a str,
    dependencies: Vec<Dependency>,
    seen: HashSet<String>,
}

impl<'a> PyProjectDocument<'a> {
    fn new(path: &'a Path, content: &'a str) -> Self {
        Self {
            path,
            content,
            dependencies: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn push(&mut self, dependency: Dependency) {
        if self.seen.insert(dependency.name.clone()) {
            self.dependencies.push(dependency);
        }
    }

    /// A PEP 508 string inside a TOML array
    fn add_requirement(&mut self, value: &Value) {
        let Some(text) = value.as_str() else {
            // {include-group = "..."} and other tables
            return;
        };
        let Some(requirement) = parse_requirement(text) else {
            return;
        };

        let (line_number, original_line) = find_line(self.content, &format!("\"{text}\""))
            .or_else(|| find_line(self.content, &format!("'{text}'")))
            .map_or((0, text.to_string()), |(n, line)| (n, line.to_string()));

        self.push(Dependency::new(
            requirement.name,
            requirement.raw_spec,
            requirement.spec,
            self.path,
            line_number,
            original_line,
        ));
    }

    fn add_requirement_array(&mut self, value: Option<&Value>) {
        for entry in value.and_then(Value::as_array).into_iter().flatten() {
            self.add_requirement(entry);
        }
    }

    /// Table of arrays, e.g. optional-dependencies or dependency-groups
    fn add_requirement_groups(&mut self, value: Option<&Value>) {
        for (_group, entries) in value.and_then(Value::as_table).into_iter().flatten() {
            self.add_requirement_array(Some(entries));
        }
    }

    /// A Poetry `name = "^1.0"` or `name = {version = "^1.0"}` table
    fn add_poetry_table(&mut self, section: &str, value: Option<&Value>) {
        for (key, entry) in value.and_then(Value::as_table).into_iter().flatten() {
            if key == "python" {
                continue;
            }
            let raw = match entry {
                Value::String(s) => s.as_str(),
                Value::Table(table) => match table.get("version").and_then(Value::as_str) {
                    Some(version) => version,
                    // git/path/url dependencies carry no version
                    None => continue,
                },
                _ => continue,
            };

            let spec = VersionSpec::parse(raw).unwrap_or_else(|_| VersionSpec::Complex(raw.to_string()));
            let (line_number, original_line) = find_key_line(self.content, section, key)
                .map_or((0, format!("{key} = \"{raw}\"")), |(n, line)| (n, line.to_string()));

            self.push(Dependency::new(
                normalize_name(key),
                raw,
                spec,
                self.path,
                line_number,
                original_line,
            ));
        }
    }
}

impl PyProjectParser {
    pub fn new() -> Self {
        Self
    }
}

impl DependencyParser for PyProjectParser {
    fn parse(&self, path: &Path) -> Result<Vec<Dependency>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let doc: Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML: {}", path.display()))?;

        let mut document = PyProjectDocument::new(path, &content);

        // PEP 621
        let project = doc.get("project");
        document.add_requirement_array(project.and_then(|p| p.get("dependencies")));
        document.add_requirement_groups(project.and_then(|p| p.get("optional-dependencies")));

        // Poetry
        let poetry = doc.get("tool").and_then(|t| t.get("poetry"));
        document.add_poetry_table(
            "tool.poetry.dependencies",
            poetry.and_then(|p| p.get("dependencies")),
        );
        document.add_poetry_table(
            "tool.poetry.dev-dependencies",
            poetry.and_then(|p| p.get("dev-dependencies")),
        );
        for (group, table) in poetry
            .and_then(|p| p.get("group"))
            .and_then(Value::as_table)
            .into_iter()
            .flatten()
        {
            document.add_poetry_table(
                &format!("tool.poetry.group.{group}.dependencies"),
                table.get("dependencies"),
            );
        }

        // PDM
        let pdm = doc.get("tool").and_then(|t| t.get("pdm"));
        document.add_requirement_groups(pdm.and_then(|p| p.get("dev-dependencies")));

        // PEP 735
        document.add_requirement_groups(doc.get("dependency-groups"));

        tracing::debug!(
            file = %path.display(),
            count = document.dependencies.len(),
            "parsed pyproject"
        );
        Ok(document.dependencies)
    }

    fn can_parse(&self, path: &Path) -> bool {
        path.file_name().and_then(|n| n.to_str()) == Some("pyproject.toml")
    }
}
