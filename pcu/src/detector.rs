use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Detected package manager type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    Pip,
    Uv,
    Poetry,
    Pdm,
    Conda,
    Pipenv,
}

impl PackageManager {
    /// Command to run after a manifest has been rewritten
    pub fn sync_command(self, file: &Path) -> String {
        match self {
            PackageManager::Pip => {
                let name = file
                    .file_name()
                    .map_or_else(|| "requirements.txt".into(), |n| n.to_string_lossy());
                format!("pip install -r {name}")
            }
            PackageManager::Uv => "uv lock".to_string(),
            PackageManager::Poetry => "poetry lock".to_string(),
            PackageManager::Pdm => "pdm lock".to_string(),
            PackageManager::Conda => "conda env update".to_string(),
            PackageManager::Pipenv => "pipenv lock".to_string(),
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageManager::Pip => write!(f, "pip"),
            PackageManager::Uv => write!(f, "uv"),
            PackageManager::Poetry => write!(f, "poetry"),
            PackageManager::Pdm => write!(f, "pdm"),
            PackageManager::Conda => write!(f, "conda"),
            PackageManager::Pipenv => write!(f, "pipenv"),
        }
    }
}

/// A dependency manifest and the tool that owns it
#[derive(Debug, Clone)]
pub struct DetectedFile {
    pub path: PathBuf,
    pub package_manager: PackageManager,
}

/// Detects package managers and dependency files in a project
pub struct ProjectDetector {
    project_path: PathBuf,
}

impl ProjectDetector {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
        }
    }

    /// Detect all dependency files in the project
    pub fn detect(&self) -> anyhow::Result<Vec<DetectedFile>> {
        let mut detected = Vec::new();

        let pyproject_path = self.project_path.join("pyproject.toml");
        if pyproject_path.is_file()
            && let Some(pm) = self.pyproject_manager(&pyproject_path)?
        {
            detected.push(DetectedFile {
                path: pyproject_path,
                package_manager: pm,
            });
        }

        let mut requirements: Vec<PathBuf> = fs::read_dir(&self.project_path)
            .with_context(|| format!("Failed to read {}", self.project_path.display()))?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with("requirements") && n.ends_with(".txt"))
            })
            .collect();
        requirements.sort();
        detected.extend(requirements.into_iter().map(|path| DetectedFile {
            path,
            package_manager: PackageManager::Pip,
        }));

        for (filename, pm) in [
            ("environment.yml", PackageManager::Conda),
            ("environment.yaml", PackageManager::Conda),
            ("Pipfile", PackageManager::Pipenv),
        ] {
            let path = self.project_path.join(filename);
            if path.is_file() {
                detected.push(DetectedFile {
                    path,
                    package_manager: pm,
                });
            }
        }

        tracing::debug!(count = detected.len(), path = %self.project_path.display(), "detected dependency files");
        Ok(detected)
    }

    /// Work out which tool manages a pyproject.toml
    ///
    /// Lock files win over tool tables; a bare PEP 621 project is treated as uv.
    pub fn pyproject_manager(&self, pyproject_path: &Path) -> anyhow::Result<Option<PackageManager>> {
        let contents = fs::read_to_string(pyproject_path)
            .with_context(|| format!("Failed to read {}", pyproject_path.display()))?;
        let doc: toml::Table = contents
            .parse()
            .with_context(|| format!("Failed to parse {}", pyproject_path.display()))?;

        let tool = doc.get("tool").and_then(|t| t.as_table());
        let has_tool = |name: &str| tool.is_some_and(|t| t.contains_key(name));
        let has_lock = |name: &str| self.project_path.join(name).is_file();

        if has_lock("poetry.lock") || has_tool("poetry") {
            return Ok(Some(PackageManager::Poetry));
        }
        if has_lock("pdm.lock") || has_tool("pdm") {
            return Ok(Some(PackageManager::Pdm));
        }
        if has_lock("uv.lock") {
            return Ok(Some(PackageManager::Uv));
        }

        let project = doc.get("project").and_then(|p| p.as_table());
        let has_project_deps = project.is_some_and(|p| {
            p.contains_key("dependencies") || p.contains_key("optional-dependencies")
        });
        if has_project_deps || doc.contains_key("dependency-groups") {
            Ok(Some(PackageManager::Uv))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn detect(files: &[(&str, &str)]) -> Vec<DetectedFile> {
        let temp_dir = TempDir::new().unwrap();
        for (name, contents) in files {
            fs::write(temp_dir.path().join(name), contents).unwrap();
        }
        ProjectDetector::new(temp_dir.path()).detect().unwrap()
    }

    fn managers(detected: &[DetectedFile]) -> Vec<PackageManager> {
        detected.iter().map(|d| d.package_manager).collect()
    }

    #[test]
    fn test_detect_requirements_sorted() {
        let detected = detect(&[
            ("requirements.txt", "requests==2.28.0\n"),
            ("requirements-dev.txt", "pytest==7.0.0\n"),
        ]);
        let names: Vec<_> = detected
            .iter()
            .map(|d| d.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["requirements-dev.txt", "requirements.txt"]);
        assert!(detected.iter().all(|d| d.package_manager == PackageManager::Pip));
    }

    #[test]
    fn test_detect_poetry_by_lock_or_table() {
        let by_lock = detect(&[
            ("pyproject.toml", "[project]\nname = \"x\"\n"),
            ("poetry.lock", ""),
            ("uv.lock", ""),
        ]);
        assert_eq!(managers(&by_lock), [PackageManager::Poetry]);

        let by_table = detect(&[("pyproject.toml", "[tool.poetry]\nname = \"test\"\n")]);
        assert_eq!(managers(&by_table), [PackageManager::Poetry]);
    }

    #[test]
    fn test_detect_pdm() {
        let detected = detect(&[("pyproject.toml", "[tool.pdm]\n"), ("pdm.lock", "")]);
        assert_eq!(managers(&detected), [PackageManager::Pdm]);
    }

    #[test]
    fn test_detect_uv() {
        let with_lock = detect(&[
            ("pyproject.toml", "[project]\nname = \"test\"\ndependencies = []\n"),
            ("uv.lock", ""),
        ]);
        assert_eq!(managers(&with_lock), [PackageManager::Uv]);

        let groups_only = detect(&[("pyproject.toml", "[dependency-groups]\ndev = [\"pytest\"]\n")]);
        assert_eq!(managers(&groups_only), [PackageManager::Uv]);
    }

    #[test]
    fn test_pyproject_without_dependencies_ignored() {
        let detected = detect(&[("pyproject.toml", "[tool.ruff]\nline-length = 100\n")]);
        assert!(detected.is_empty());
    }

    #[test]
    fn test_mentioning_dependencies_in_a_string_is_not_enough() {
        let detected = detect(&[(
            "pyproject.toml",
            "[project]\nname = \"test\"\ndescription = \"no dependencies here\"\n",
        )]);
        assert!(detected.is_empty());
    }

    #[test]
    fn test_detect_mixed_project_order() {
        let detected = detect(&[
            ("Pipfile", "[packages]\n"),
            ("environment.yml", "name: test\n"),
            ("requirements.txt", "requests==2.28.0\n"),
            ("pyproject.toml", "[project]\ndependencies = []\n"),
        ]);
        assert_eq!(
            managers(&detected),
            [
                PackageManager::Uv,
                PackageManager::Pip,
                PackageManager::Conda,
                PackageManager::Pipenv
            ]
        );
    }

    #[test]
    fn test_sync_command() {
        assert_eq!(
            PackageManager::Pip.sync_command(Path::new("/p/requirements-dev.txt")),
            "pip install -r requirements-dev.txt"
        );
        assert_eq!(PackageManager::Uv.sync_command(Path::new("pyproject.toml")), "uv lock");
        assert_eq!(PackageManager::Poetry.sync_command(Path::new("pyproject.toml")), "poetry lock");
        assert_eq!(PackageManager::Pdm.sync_command(Path::new("pyproject.toml")), "pdm lock");
        assert_eq!(
            PackageManager::Conda.sync_command(Path::new("environment.yml")),
            "conda env update"
        );
        assert_eq!(PackageManager::Pipenv.sync_command(Path::new("Pipfile")), "pipenv lock");
    }
}
