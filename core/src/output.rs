use crate::types::{DependencyCheck, UpdateSeverity};
use colored::Colorize;
use std::io::{self, Write};

/// Severity label, colored red/yellow/green when colors are on
pub fn severity_label(severity: Option<UpdateSeverity>, show_colors: bool) -> String {
    let Some(severity) = severity else {
        return String::new();
    };
    let label = match severity {
        UpdateSeverity::Major => "MAJOR",
        UpdateSeverity::Minor => "minor",
        UpdateSeverity::Patch => "patch",
    };
    if !show_colors {
        return label.to_string();
    }
    match severity {
        UpdateSeverity::Major => label.red(),
        UpdateSeverity::Minor => label.yellow(),
        UpdateSeverity::Patch => label.green(),
    }
    .to_string()
}

/// Renders the dependency check results in a table format
pub struct TableRenderer {
    show_colors: bool,
}

impl TableRenderer {
    pub fn new(show_colors: bool) -> Self {
        Self { show_colors }
    }

    /// Render all packages with updates to stdout
    pub fn render(&self, checks: &[DependencyCheck]) -> io::Result<()> {
        let stdout = io::stdout();
        self.render_to(&mut stdout.lock(), checks)
    }

    /// Render all packages with updates to a writer
    ///
    /// A package declared in several files with the same target is shown once.
    pub fn render_to<W: Write>(&self, out: &mut W, checks: &[DependencyCheck]) -> io::Result<()> {
        let mut rows: Vec<&DependencyCheck> = Vec::new();
        for check in checks.iter().filter(|c| c.has_update()) {
            let duplicate = rows
                .iter()
                .any(|r| r.dependency.name == check.dependency.name && r.target == check.target);
            if !duplicate {
                rows.push(check);
            }
        }

        if rows.is_empty() {
            return writeln!(out, "All dependencies are up to date!");
        }

        let name_w = rows.iter().map(|c| c.dependency.name.len()).max().unwrap_or(0);
        let from_w = rows
            .iter()
            .filter_map(|c| c.current_version())
            .map(|v| v.to_string().len())
            .max()
            .unwrap_or(0);
        let to_w = rows
            .iter()
            .filter_map(|c| c.target.as_ref())
            .map(|v| v.to_string().len())
            .max()
            .unwrap_or(0);

        writeln!(out, "Outdated dependencies:\n")?;

        for check in rows {
            let from = check
                .current_version()
                .map(ToString::to_string)
                .unwrap_or_default();
            let to = check
                .target
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            let hint = if check.has_newer_available() {
                format!("  ({} available)", check.latest)
            } else {
                String::new()
            };

            writeln!(
                out,
                "  {:<name_w$}  {from:>from_w$} → {to:<to_w$}  {}{hint}",
                check.dependency.name,
                severity_label(check.severity, self.show_colors),
            )?;
        }

        Ok(())
    }
}
