use super::normalize_name;
use anyhow::{Context, Result};
use check_updates_core::Version;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Installed versions by normalized package name
pub type InstalledVersions = HashMap<String, Version>;

/// Lock files in lookup priority order
const LOCK_FILES: &[&str] = &["uv.lock", "poetry.lock", "pdm.lock", "Pipfile.lock"];

/// Reads installed versions out of lock files
#[derive(Debug, Default)]
pub struct LockfileParser;

/// `[[package]]` entries shared by uv, poetry and pdm locks
#[derive(Debug, Deserialize)]
struct TomlLockFile {
    #[serde(default)]
    package: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: String,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PipfileLock {
    #[serde(default)]
    default: BTreeMap<String, PipfileLockEntry>,
    #[serde(default)]
    develop: BTreeMap<String, PipfileLockEntry>,
}

#[derive(Debug, Deserialize)]
struct PipfileLockEntry {
    version: Option<String>,
}

impl LockfileParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a lock file and return a map of package name -> installed version
    pub fn parse(&self, path: &Path) -> Result<InstalledVersions> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Invalid lock file path")?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let entries: Vec<(String, Option<String>)> = match filename {
            "uv.lock" | "poetry.lock" | "pdm.lock" => {
                let lock: TomlLockFile = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                lock.package
                    .into_iter()
                    .map(|p| (p.name, p.version))
                    .collect()
            }
            "Pipfile.lock" => {
                let lock: PipfileLock = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                lock.default
                    .into_iter()
                    .chain(lock.develop)
                    .map(|(name, entry)| {
                        // Pipfile.lock pins as "==1.2.3"
                        let version = entry
                            .version
                            .map(|v| v.trim_start_matches("==").to_string());
                        (name, version)
                    })
                    .collect()
            }
            _ => anyhow::bail!("Unsupported lock file: {filename}"),
        };

        let mut versions = InstalledVersions::new();
        for (name, version) in entries {
            // Editable/virtual packages have no version
            let Some(version) = version else { continue };
            match Version::from_str(&version) {
                Ok(parsed) => {
                    versions.entry(normalize_name(&name)).or_insert(parsed);
                }
                Err(e) => {
                    tracing::warn!(package = %name, version = %version, error = %e, "skipping unparseable locked version");
                }
            }
        }

        tracing::debug!(file = %path.display(), count = versions.len(), "read lock file");
        Ok(versions)
    }

    /// Parse the first lock file found in `dir`, or an empty map when there is none
    pub fn find_and_parse(&self, dir: &Path) -> Result<InstalledVersions> {
        match LOCK_FILES.iter().map(|f| dir.join(f)).find(|p| p.is_file()) {
            Some(path) => self.parse(&path),
            None => Ok(InstalledVersions::new()),
        }
    }

    /// Check if we can parse this lock file
    pub fn can_parse(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| LOCK_FILES.contains(&n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_uv_lock() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "uv.lock",
            r#"version = 1

[[package]]
name = "requests"
version = "2.31.0"

[[package]]
name = "Typing_Extensions"
version = "4.12.2"

[[package]]
name = "myproject"
source = { editable = "." }
"#,
        );

        let versions = LockfileParser::new().parse(&path).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions["requests"].to_string(), "2.31.0");
        assert_eq!(versions["typing-extensions"].to_string(), "4.12.2");
    }

    #[test]
    fn test_bad_version_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "poetry.lock",
            r#"[[package]]
name = "weird"
version = "not a version"

[[package]]
name = "Django"
version = "4.2.0"
"#,
        );

        let versions = LockfileParser::new().parse(&path).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions["django"].to_string(), "4.2.0");
    }

    #[test]
    fn test_parse_pipfile_lock() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "Pipfile.lock",
            r#"{
  "_meta": {"hash": {"sha256": "abc"}},
  "default": {"requests": {"version": "==2.31.0"}, "local": {"editable": true, "path": "."}},
  "develop": {"pytest": {"version": "==7.4.0"}}
}"#,
        );

        let versions = LockfileParser::new().parse(&path).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions["requests"].to_string(), "2.31.0");
        assert_eq!(versions["pytest"].to_string(), "7.4.0");
    }

    #[test]
    fn test_find_and_parse_priority() {
        let dir = TempDir::new().unwrap();
        write(&dir, "poetry.lock", "[[package]]\nname = \"requests\"\nversion = \"2.0.0\"\n");
        write(&dir, "uv.lock", "[[package]]\nname = \"requests\"\nversion = \"2.31.0\"\n");

        let versions = LockfileParser::new().find_and_parse(dir.path()).unwrap();
        assert_eq!(versions["requests"].to_string(), "2.31.0");
    }

    #[test]
    fn test_find_and_parse_no_lockfile() {
        let dir = TempDir::new().unwrap();
        let versions = LockfileParser::new().find_and_parse(dir.path()).unwrap();
        assert!(versions.is_empty());
    }

    #[test]
    fn test_can_parse() {
        let parser = LockfileParser::new();
        assert!(parser.can_parse(Path::new("uv.lock")));
        assert!(parser.can_parse(Path::new("Pipfile.lock")));
        assert!(!parser.can_parse(Path::new("requirements.txt")));
    }
}
