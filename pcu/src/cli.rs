use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Check for outdated Python dependencies
#[derive(Parser, Debug, Clone)]
#[command(name = "pcu")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to project directory (defaults to current directory)
    #[arg(value_name = "PATH", conflicts_with = "global")]
    pub path: Option<PathBuf>,

    /// Check globally installed packages (uv tools, pipx, pip --user)
    #[arg(short, long)]
    pub global: bool,

    /// Update dependency files (patch updates only by default)
    #[arg(short, long)]
    pub update: bool,

    /// Include minor updates (use with -u as -um); in global mode, stay within the installed major
    #[arg(short, long)]
    pub minor: bool,

    /// Force update all to absolute latest (use with -u as -uf)
    #[arg(short, long)]
    pub force: bool,

    /// Include pre-release versions
    #[arg(short, long)]
    pub pre_release: bool,

    /// Configuration file (defaults to ./pcu.yaml, then the user config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Get the project path, defaulting to current directory
    pub fn project_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_short_flags() {
        let args = Args::try_parse_from(["pcu", "-um", "some/dir"]).unwrap();
        assert!(args.update);
        assert!(args.minor);
        assert!(!args.force);
        assert_eq!(args.project_path(), PathBuf::from("some/dir"));
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["pcu"]).unwrap();
        assert_eq!(args.project_path(), PathBuf::from("."));
        assert_eq!(args.verbose, 0);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_verbosity_and_config() {
        let args = Args::try_parse_from(["pcu", "-vv", "--config", "pcu.yaml"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.config, Some(PathBuf::from("pcu.yaml")));
    }

    #[test]
    fn test_global_conflicts_with_path() {
        assert!(Args::try_parse_from(["pcu", "-g", "some/dir"]).is_err());
    }
}
