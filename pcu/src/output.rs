use crate::global::{GlobalCheck, GlobalSource};
use crate::python::{PythonInfo, UvPythonCheck};
use check_updates_core::{UpdateSeverity, severity_label};
use colored::Colorize;
use std::collections::BTreeMap;
use std::io::{self, Write};

pub use check_updates_core::TableRenderer;

/// `Python 3.11.5 (3.13.1 available)` header line
pub fn python_header(info: &PythonInfo, show_colors: bool) -> String {
    match &info.latest {
        Some(latest) if info.has_update() => {
            let latest = if show_colors {
                latest.to_string().yellow().to_string()
            } else {
                latest.to_string()
            };
            format!("Python {} ({latest} available)", info.current)
        }
        Some(_) => format!("Python {} (latest)", info.current),
        None => format!("Python {}", info.current),
    }
}

/// Renders global package check results grouped by source
pub struct GlobalTableRenderer {
    show_colors: bool,
}

impl GlobalTableRenderer {
    pub fn new(show_colors: bool) -> Self {
        Self { show_colors }
    }

    pub fn render(&self, checks: &[GlobalCheck]) -> io::Result<()> {
        let stdout = io::stdout();
        self.render_to(&mut stdout.lock(), checks)
    }

    /// Render one section per source; pip --user is split by Python version
    pub fn render_to<W: Write>(&self, out: &mut W, checks: &[GlobalCheck]) -> io::Result<()> {
        let mut groups: BTreeMap<(GlobalSource, Option<&str>), Vec<&GlobalCheck>> = BTreeMap::new();
        for check in checks {
            let python = match check.package.source {
                GlobalSource::PipUser => Some(check.package.python_version.as_deref().unwrap_or("unknown")),
                _ => None,
            };
            groups.entry((check.package.source, python)).or_default().push(check);
        }

        for (i, ((source, python), group)) in groups.iter().enumerate() {
            if i > 0 {
                writeln!(out)?;
            }
            match (source, python) {
                (GlobalSource::Uv, _) => writeln!(out, "uv tools:")?,
                (GlobalSource::Pipx, _) => writeln!(out, "pipx:")?,
                (GlobalSource::PipUser, python) => {
                    writeln!(out, "pip --user (Python {}):", python.unwrap_or("unknown"))?;
                }
            }

            let mut updates: Vec<&GlobalCheck> = group.iter().filter(|c| c.has_update).copied().collect();
            if updates.is_empty() {
                writeln!(out, "  All packages up to date.")?;
                continue;
            }
            updates.sort_by_key(|c| c.package.name.to_lowercase());
            self.render_rows(out, &updates)?;
        }
        Ok(())
    }

    fn render_rows<W: Write>(&self, out: &mut W, checks: &[&GlobalCheck]) -> io::Result<()> {
        let name_w = checks.iter().map(|c| c.package.name.len()).max().unwrap_or(0);
        let from_w = checks
            .iter()
            .map(|c| c.package.installed_version.to_string().len())
            .max()
            .unwrap_or(0);
        let to_w = checks.iter().map(|c| c.latest.to_string().len()).max().unwrap_or(0);

        for check in checks {
            writeln!(
                out,
                "  {:<name_w$}  {:>from_w$} → {:<to_w$}  {}",
                check.package.name,
                check.package.installed_version.to_string(),
                check.latest.to_string(),
                severity_label(check.update_severity(), self.show_colors),
            )?;
        }
        Ok(())
    }
}

/// Renders uv-managed Python version checks
pub struct UvPythonTableRenderer {
    show_colors: bool,
}

impl UvPythonTableRenderer {
    pub fn new(show_colors: bool) -> Self {
        Self { show_colors }
    }

    pub fn render(&self, checks: &[UvPythonCheck]) -> io::Result<()> {
        let stdout = io::stdout();
        self.render_to(&mut stdout.lock(), checks)
    }

    pub fn render_to<W: Write>(&self, out: &mut W, checks: &[UvPythonCheck]) -> io::Result<()> {
        if checks.is_empty() {
            return Ok(());
        }

        writeln!(out, "uv-managed Python installations:")?;

        let mut updates: Vec<&UvPythonCheck> = checks.iter().filter(|c| c.has_update).collect();
        if updates.is_empty() {
            return writeln!(out, "  All Python versions up to date.");
        }
        updates.sort_by(|a, b| a.installed_version.cmp(&b.installed_version));

        let series_w = updates.iter().map(|c| c.series.len()).max().unwrap_or(0);
        let from_w = updates
            .iter()
            .map(|c| c.installed_version.to_string().len())
            .max()
            .unwrap_or(0);

        for check in updates {
            // Within a series an update is a patch; anything else is a newer series
            let severity = if check.is_patch_update() {
                UpdateSeverity::Patch
            } else {
                UpdateSeverity::Minor
            };
            writeln!(
                out,
                "  {:<series_w$}  {:>from_w$} → {}  {}",
                check.series,
                check.installed_version.to_string(),
                check.latest_version,
                severity_label(Some(severity), self.show_colors),
            )?;
        }
        Ok(())
    }
}
