#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a temporary project directory
pub struct TempProject {
    pub dir: TempDir,
}

impl TempProject {
    /// Create a new temporary project
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        Self { dir }
    }

    /// Get the path to the project directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a file in the project with the given content
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(relative_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Requirements file with nothing the checker would query
pub fn comments_only_requirements() -> &'static str {
    "# pinned by the platform team\n\n-r base.txt\n--index-url https://example.org/simple\n"
}

/// A pyproject.toml no supported tool owns
pub fn bare_pyproject() -> &'static str {
    "[build-system]\nrequires = [\"setuptools\"]\nbuild-backend = \"setuptools.build_meta\"\n"
}

/// Project with an empty requirements file and a bare pyproject
pub fn create_project_without_dependencies() -> TempProject {
    let project = TempProject::new();
    project.create_file("requirements.txt", comments_only_requirements());
    project.create_file("pyproject.toml", bare_pyproject());
    project
}
