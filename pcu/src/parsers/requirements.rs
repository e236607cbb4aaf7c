use super::{Dependency, DependencyParser, parse_requirement};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parser for requirements*.txt files
#[derive(Debug, Default)]
pub struct RequirementsParser;

impl RequirementsParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one logical line (continuations already joined)
    ///
    /// `physical` holds the numbered source lines it was joined from; the
    /// dependency is recorded on the one where its specifier is written.
    fn parse_line(logical: &str, physical: &[(usize, &str)], source_file: &Path) -> Option<Dependency> {
        let line = logical.trim();

        // Comments, blank lines, -r/-c includes, -e and other pip options
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            return None;
        }

        let line = match line.find('#') {
            Some(idx) => line[..idx].trim(),
            None => line,
        };

        let requirement = parse_requirement(strip_options(line))?;
        let &(line_number, original_line) = physical
            .iter()
            .find(|(_, text)| !requirement.raw_spec.is_empty() && text.contains(&requirement.raw_spec))
            .or_else(|| physical.first())?;

        Some(Dependency::new(
            requirement.name,
            requirement.raw_spec,
            requirement.spec,
            source_file,
            line_number,
            original_line,
        ))
    }
}

/// Drop per-requirement options such as `--hash=sha256:...` or `--config-settings`
fn strip_options(line: &str) -> &str {
    line.char_indices()
        .find(|&(i, c)| c.is_whitespace() && line[i + c.len_utf8()..].starts_with("--"))
        .map_or(line, |(i, _)| line[..i].trim_end())
}

impl DependencyParser for RequirementsParser {
    fn parse(&self, path: &Path) -> Result<Vec<Dependency>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read requirements file: {}", path.display()))?;

        let mut dependencies = Vec::new();
        let mut physical: Vec<(usize, &str)> = Vec::new();
        let mut logical = String::new();

        for (idx, line) in content.lines().enumerate() {
            physical.push((idx + 1, line));

            if let Some(head) = line.trim_end().strip_suffix('\\') {
                logical.push_str(head);
                logical.push(' ');
                continue;
            }

            logical.push_str(line);
            if let Some(dep) = Self::parse_line(&logical, &physical, path) {
                dependencies.push(dep);
            }
            physical.clear();
            logical.clear();
        }

        // A trailing backslash on the last line
        if !physical.is_empty()
            && let Some(dep) = Self::parse_line(&logical, &physical, path)
        {
            dependencies.push(dep);
        }

        tracing::debug!(file = %path.display(), count = dependencies.len(), "parsed requirements");
        Ok(dependencies)
    }

    fn can_parse(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("requirements") && n.ends_with(".txt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use check_updates_core::VersionSpec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(contents: &str) -> Vec<Dependency> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        RequirementsParser::new().parse(file.path()).unwrap()
    }

    #[test]
    fn test_parse_simple_package() {
        let deps = parse("requests==2.28.0\nnumpy>=1.24.0\nflask\n");

        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "requests");
        assert!(matches!(deps[0].version_spec, VersionSpec::Pinned(_)));
        assert_eq!(deps[0].raw_spec, "==2.28.0");
        assert!(matches!(deps[1].version_spec, VersionSpec::Minimum(_)));
        assert!(matches!(deps[2].version_spec, VersionSpec::Any));
    }

    #[test]
    fn test_parse_with_extras_and_markers() {
        let deps = parse(
            "celery[redis,msgpack]==5.2.0\ndataclasses>=0.6; python_version < '3.7'\nTyping_Extensions>=4.0\n",
        );

        let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["celery", "dataclasses", "typing-extensions"]);
        assert_eq!(deps[1].raw_spec, ">=0.6");
    }

    #[test]
    fn test_parse_skips_comments_options_and_urls() {
        let deps = parse(
            "# comment\n--index-url https://pypi.org/simple\n-r requirements-dev.txt\n-e .\n\
             git+https://github.com/org/repo.git#egg=repo\nmylib @ https://example.com/mylib.whl\n\
             requests==2.28.0  # inline comment\n",
        );

        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "requests");
        assert_eq!(deps[0].raw_spec, "==2.28.0");
    }

    #[test]
    fn test_parse_complex_version_specs() {
        let deps = parse("django>=2.0,<3.0\npytest~=7.0\nclick!=8.0.0\n");

        assert!(matches!(deps[0].version_spec, VersionSpec::Range { .. }));
        assert!(matches!(deps[1].version_spec, VersionSpec::Compatible(_)));
        assert!(matches!(deps[2].version_spec, VersionSpec::NotEqual(_)));
    }

    #[test]
    fn test_line_continuation() {
        let deps = parse("requests>=2.28.0 \\\n    ; python_version >= '3.8'\nnumpy==1.24.0\n");

        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].line_number, 1);
        assert!(matches!(deps[0].version_spec, VersionSpec::Minimum(_)));
        assert_eq!(deps[1].line_number, 3);
    }

    #[test]
    fn test_continued_specifier_recorded_on_its_own_line() {
        let deps = parse("requests \\\n    ==2.28.0\nflask\n");

        assert_eq!(deps[0].line_number, 2);
        assert_eq!(deps[0].original_line, "    ==2.28.0");
        assert_eq!(deps[0].raw_spec, "==2.28.0");
        assert_eq!(deps[1].line_number, 3);
    }

    #[test]
    fn test_hashed_requirements() {
        let deps = parse(
            "requests==2.28.0 \\\n    --hash=sha256:abcdef \\\n    --hash=sha256:012345\n\
             flask==2.0.0 --hash=sha256:123\n\
             numpy>=1.24 --config-settings=editable_mode=compat\n",
        );

        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].raw_spec, "==2.28.0");
        assert!(matches!(deps[0].version_spec, VersionSpec::Pinned(_)));
        assert_eq!(deps[0].line_number, 1);
        assert_eq!(deps[1].raw_spec, "==2.0.0");
        assert!(matches!(deps[1].version_spec, VersionSpec::Pinned(_)));
        assert_eq!(deps[2].raw_spec, ">=1.24");
        assert_eq!(deps[2].line_number, 5);
    }

    #[test]
    fn test_line_numbers() {
        let deps = parse("# Comment line\nrequests==2.28.0\n\nnumpy>=1.24.0\n");

        assert_eq!(deps[0].line_number, 2);
        assert_eq!(deps[0].original_line, "requests==2.28.0");
        assert_eq!(deps[1].line_number, 4);
    }

    #[test]
    fn test_can_parse() {
        let parser = RequirementsParser::new();
        assert!(parser.can_parse(Path::new("requirements.txt")));
        assert!(parser.can_parse(Path::new("requirements-dev.txt")));
        assert!(!parser.can_parse(Path::new("pyproject.toml")));
        assert!(!parser.can_parse(Path::new("setup.py")));
    }
}
