pub mod cli;
pub mod config;
pub mod detector;
pub mod global;
pub mod logging;
pub mod output;
pub mod parsers;
pub mod progress;
pub mod pypi;
pub mod python;
pub mod updater;

// Re-export core types for convenience
pub use check_updates_core::{
    Dependency, DependencyCheck, DependencyResolver, PackageInfo, TableRenderer, UpdateSeverity,
    Version, VersionError, VersionSpec,
};
