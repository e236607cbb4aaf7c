use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use pcu::cli::Args;
use pcu::config::{AppSettings, ConfigManager};
use pcu::detector::ProjectDetector;
use pcu::global::{GlobalCheck, GlobalPackageDiscovery, SystemRunner, UpgradeCommand};
use pcu::logging::{self, OperationTimer};
use pcu::output::{GlobalTableRenderer, TableRenderer, UvPythonTableRenderer, python_header};
use pcu::parsers::{Dependency, LockfileParser, parser_for};
use pcu::progress::{progress_bar, resolve_theme};
use pcu::pypi::{GetPackagesResult, PyPiClient};
use pcu::python::{
    EndOfLifeClient, PythonInfo, PythonReleases, detect_python_version, discover_uv_pythons,
    uv_python_upgrade_commands,
};
use pcu::updater::FileUpdater;
use pcu::{DependencyCheck, DependencyResolver};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigManager::load(args.config.as_deref()).context("Failed to load configuration")?;
    let settings = config.settings();
    let stats = logging::init(&settings.logging, args.verbose, settings.debug)?;
    if let Some(path) = config.path() {
        tracing::debug!(config = %path.display(), "configuration file in use");
    }

    let result = if args.global {
        run_global_mode(&args, &settings).await
    } else {
        run_project_mode(&args, &settings).await
    };

    let snapshot = stats.snapshot();
    tracing::debug!(
        total = snapshot.total_messages,
        errors = snapshot.errors_count,
        uptime_ms = snapshot.uptime.as_millis(),
        "log statistics"
    );
    result
}

fn pypi_client(args: &Args, settings: &AppSettings) -> PyPiClient {
    PyPiClient::new(args.pre_release || settings.pre_release)
        .with_index_url(&settings.index_url)
        .with_concurrency(settings.logging.parallel.max_workers)
        .with_timeout(Duration::from_secs(settings.timeout_secs))
}

/// Fetch registry data behind a themed progress bar, together with Python release data
async fn fetch_all(
    client: &PyPiClient,
    names: &[String],
    settings: &AppSettings,
) -> Result<(GetPackagesResult, Option<PythonReleases>)> {
    let _timer = OperationTimer::start("fetch packages");
    let theme = resolve_theme(&settings.logging.progress);
    let bar = progress_bar(u64::try_from(names.len()).unwrap_or(u64::MAX), &theme, "Fetching");
    let callback_bar = bar.clone();

    let eol_client = EndOfLifeClient::new();
    let (packages, releases) = tokio::join!(
        client.get_packages(names, move |done, _total| {
            callback_bar.set_position(u64::try_from(done).unwrap_or(u64::MAX));
        }),
        eol_client.fetch()
    );
    bar.finish_and_clear();

    let releases = releases
        .inspect_err(|e| tracing::debug!(error = %e, "Python release data unavailable"))
        .ok();
    Ok((packages?, releases))
}

async fn python_info(releases: Option<&PythonReleases>) -> Option<PythonInfo> {
    let current = tokio::task::spawn_blocking(|| detect_python_version(&SystemRunner))
        .await
        .ok()
        .flatten()?;
    Some(PythonInfo {
        current,
        latest: releases.and_then(PythonReleases::latest).cloned(),
    })
}

fn print_fetch_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("{}", "Packages not found on PyPI:".dimmed());
    for error in errors {
        println!("  {}", error.dimmed());
    }
}

async fn run_global_mode(args: &Args, settings: &AppSettings) -> Result<()> {
    if args.update {
        println!("Note: --update flag is ignored in global mode. Commands will be shown instead.\n");
    }

    let discovery = Arc::new(GlobalPackageDiscovery::new());
    let packages = {
        let discovery = Arc::clone(&discovery);
        tokio::task::spawn_blocking(move || discovery.discover())
            .await
            .context("Global package discovery failed")?
    };

    let names: Vec<String> = packages
        .iter()
        .map(|p| p.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let client = pypi_client(args, settings);
    let (fetched, releases) = if names.is_empty() {
        (GetPackagesResult::default(), EndOfLifeClient::new().fetch().await.ok())
    } else {
        fetch_all(&client, &names, settings).await?
    };

    if let Some(info) = python_info(releases.as_ref()).await {
        println!("{}\n", python_header(&info, true));
    }

    let uv_pythons = match &releases {
        Some(releases) => {
            let releases = releases.clone();
            tokio::task::spawn_blocking(move || discover_uv_pythons(&SystemRunner, &releases))
                .await
                .unwrap_or_default()
        }
        None => Vec::new(),
    };

    if packages.is_empty() && uv_pythons.is_empty() {
        println!("No globally installed packages found.");
        println!("Checked: uv tools, pipx, pip --user");
        return Ok(());
    }

    let checks: Vec<GlobalCheck> = packages
        .into_iter()
        .filter_map(|package| {
            let info = fetched.packages.get(&package.name)?;
            Some(GlobalCheck::new(package, info, args.minor))
        })
        .collect();

    GlobalTableRenderer::new(true).render(&checks)?;

    if !uv_pythons.is_empty() {
        println!();
        UvPythonTableRenderer::new(true).render(&uv_pythons)?;
    }

    let mut commands = discovery.upgrade_commands(&checks);
    commands.extend(uv_python_upgrade_commands(&uv_pythons));

    if !commands.is_empty() {
        println!("\nTo upgrade, run:\n");
        for command in &commands {
            match command {
                UpgradeCommand::Command(c) => println!("  $ {c}"),
                UpgradeCommand::Comment(_) => println!("  {}", command.to_string().dimmed()),
            }
        }
    }

    if !fetched.errors.is_empty() {
        println!();
        print_fetch_errors(&fetched.errors);
    }

    Ok(())
}

async fn run_project_mode(args: &Args, settings: &AppSettings) -> Result<()> {
    let project_path = args.project_path();

    if !project_path.exists() {
        anyhow::bail!("Project path does not exist: {}", project_path.display());
    }
    if !project_path.is_dir() {
        anyhow::bail!("Project path is not a directory: {}", project_path.display());
    }

    let detected = ProjectDetector::new(&project_path).detect()?;
    if detected.is_empty() {
        println!("No dependency files found in {}", project_path.display());
        return Ok(());
    }
    for file in &detected {
        tracing::debug!(file = %file.path.display(), manager = %file.package_manager, "detected manifest");
    }

    let dependencies: Vec<Dependency> = {
        let _timer = OperationTimer::start("parse manifests");
        detected
            .par_iter()
            .map(|file| {
                parser_for(file.package_manager)
                    .parse(&file.path)
                    .with_context(|| format!("Failed to parse {}", file.path.display()))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect()
    };

    if dependencies.is_empty() {
        println!("No dependencies found in any files");
        return Ok(());
    }

    let installed = LockfileParser::new()
        .find_and_parse(&project_path)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring unreadable lock file");
            Default::default()
        });

    let names: Vec<String> = dependencies
        .iter()
        .map(|d| d.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let client = pypi_client(args, settings);
    let (fetched, releases) = fetch_all(&client, &names, settings).await?;

    if let Some(info) = python_info(releases.as_ref()).await {
        println!("{}\n", python_header(&info, true));
    }

    if !fetched.errors.is_empty() {
        print_fetch_errors(&fetched.errors);
        println!();
    }

    let resolver = DependencyResolver::new();
    let checks: Vec<DependencyCheck> = dependencies
        .iter()
        .filter_map(|dep| {
            let info = fetched.packages.get(&dep.name)?;
            Some(resolver.resolve(dep, info, installed.get(&dep.name)))
        })
        .collect();

    TableRenderer::new(true).render(&checks)?;

    if !checks.iter().any(DependencyCheck::has_update) {
        return Ok(());
    }

    if args.update {
        let result = FileUpdater::new().apply_updates(&checks, args.minor, args.force)?;
        println!();
        if result.modified_files.is_empty() {
            println!("No files were changed. Use -um to include minor updates or -uf to force latest versions.");
        } else {
            result.print_summary()?;
        }
    } else {
        println!(
            "\nRun {} to apply patch updates, {} to include minor updates, {} to force latest versions.",
            "pcu -u".cyan(),
            "pcu -um".cyan(),
            "pcu -uf".cyan()
        );
    }

    Ok(())
}
