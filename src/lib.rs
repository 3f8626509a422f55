//! crew: local installation manager for a layered agent-configuration framework.
//!
//! crew provisions versioned components (agent definitions, slash commands,
//! hook scripts) from a template source tree into an installation directory,
//! and keeps that directory recoverable and auditable.
//!
//! # Architecture
//!
//! ## Installations
//!
//! - **Global** (`$CREW_HOME` or `~/.claude`): user-level, shared by every project
//! - **Project** (`<project>/.claude`): the project-scoped subset, filled by `crew sync`
//!
//! Both keep their own state under `.crew/`: `config/crew-metadata.json`,
//! `config/settings.toml`, `config/crew.toml` and `backups/`.
//!
//! ## Safety net
//!
//! - Every install/update/uninstall batch is preceded by a tar archive of the
//!   installation, verified by SHA-256 on restore
//! - Component operations are best-effort and never roll each other back
//! - Tracked files carry an original hash and an append-only audit log
//!
//! # Examples
//!
//! ```bash
//! crew install agents commands
//! crew integrity check
//! crew backup list
//! crew backup restore crew_backup_20260101_120000.tar.gz --overwrite
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: installation layout, metadata, integrity, archives, component lifecycle
//! - [`plugins`]: the shipped components
//! - [`catalog`]: component registration

pub mod catalog;
mod cli;
pub mod core;
pub mod plugins;

use crate::cli::{
    BackupCommand, BatchCli, Cli, Command, FeatureCommand, IntegrityCommand, MetadataCommand,
};
use crate::core::backup::{BackupManager, BackupOptions, BackupType, RestoreOptions};
use crate::core::component::ComponentContext;
use crate::core::config::{self, CrewConfig};
use crate::core::installer::{BackupPolicy, BatchOptions, BatchReport, Installer};
use crate::core::integrity::OverallStatus;
use crate::core::logging::{self, SharedLogger, TracingLogger};
use crate::core::metadata::MetadataStore;
use crate::core::store::{InstallScope, Installation};
use crate::core::sync::{SyncOptions, sync_project};
use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};

fn resolve_installation(cli: &Cli) -> anyhow::Result<Installation> {
    if let Some(project) = &cli.project {
        return Ok(Installation::project(project));
    }
    if let Some(dir) = &cli.dir {
        return Ok(Installation::new(InstallScope::Global, dir));
    }
    Installation::global().context("cannot locate the global installation (set CREW_HOME or HOME)")
}

/// Accept a path to an archive or a bare name inside the backup directory.
fn resolve_archive(manager: &BackupManager, archive: &Path) -> PathBuf {
    if archive.exists() {
        archive.to_path_buf()
    } else {
        manager.backup_dir().join(archive)
    }
}

fn print_list(label: &str, names: &[String]) {
    if !names.is_empty() {
        println!("  {:<10} {}", label, names.join(", "));
    }
}

fn print_batch(verb: &str, report: &BatchReport) {
    let headline = if report.success {
        format!("✓ {} complete", verb).bright_green().bold()
    } else {
        format!("✗ {} finished with failures", verb).bright_red().bold()
    };
    println!("{}", headline);
    if let Some(path) = &report.backup_path {
        println!("  {:<10} {}", "backup", path.display());
    }
    print_list("installed", &report.installed);
    print_list("updated", &report.updated);
    print_list("removed", &report.removed);
    print_list("planned", &report.planned);
    for name in &report.failed {
        let reason = report.errors.get(name).map(String::as_str).unwrap_or("");
        println!("  {:<10} {} {}", "failed".red(), name, reason.dimmed());
    }
    for check in &report.checks {
        let mark = if check.passed { "ok".green() } else { "FAILED".red() };
        println!("  {:<10} {} {}", "check", check.component, mark);
        for problem in &check.problems {
            println!("             {}", problem.dimmed());
        }
    }
}

fn build_installer(
    install: &Installation,
    config: &CrewConfig,
    source: Option<PathBuf>,
    logger: &SharedLogger,
) -> Installer {
    let source_root = source.unwrap_or_else(|| config::source_root(config));
    let ctx = ComponentContext::new(install, source_root, logger.clone());
    Installer::new(install.clone(), catalog::default_registry(&ctx), logger.clone())
}

fn run_batch(
    command: &Command,
    args: &BatchCli,
    install: &Installation,
    config: &CrewConfig,
    logger: &SharedLogger,
) -> anyhow::Result<()> {
    let installer = build_installer(install, config, args.source.clone(), logger);
    let names = if args.components.is_empty() {
        catalog::component_names()
    } else {
        args.components.clone()
    };
    let backup = if args.no_backup || (!config.backup.auto_backup && !args.backup) {
        BackupPolicy::Never
    } else if args.backup {
        BackupPolicy::Always
    } else {
        BackupPolicy::Auto
    };
    let opts = BatchOptions {
        dry_run: args.dry_run,
        overwrite: args.force || config.install.overwrite,
        backup,
        backup_options: BackupOptions::from_config(&config.backup, BackupType::Manual),
    };
    let (verb, report) = match command {
        Command::Update(_) => ("update", installer.update_components(&names, &opts)),
        Command::Uninstall(_) => ("uninstall", installer.uninstall_components(&names, &opts)),
        _ => ("install", installer.install_components(&names, &opts)),
    };
    print_batch(verb, &report);
    if !report.success {
        anyhow::bail!("{} failed for: {}", verb, report.failed.join(", "));
    }
    Ok(())
}

fn run_status(install: &Installation, config: &CrewConfig, logger: &SharedLogger) -> anyhow::Result<()> {
    let installer = build_installer(install, config, None, logger);
    println!(
        "{} {} ({})",
        "installation".bold(),
        install.root.display(),
        install.scope
    );
    if !install.exists() {
        println!("  {}", "not installed".yellow());
        return Ok(());
    }
    let outdated = installer.outdated()?;
    for state in installer.status() {
        let installed = match (&state.installed_version, state.installed) {
            (Some(v), true) if outdated.contains(&state.name) => format!("{} (outdated)", v).yellow(),
            (Some(v), true) => v.green(),
            (Some(v), false) => format!("{} (files missing)", v).red(),
            (None, _) => "-".dimmed(),
        };
        println!(
            "  {:<10} available {:<8} installed {}",
            state.name, state.available_version, installed
        );
    }
    let metadata = MetadataStore::new(install.clone(), logger.clone()).load()?;
    if metadata.integrity.total_files > 0 {
        println!(
            "  {:<10} {} tracked, last status {}",
            "integrity", metadata.integrity.total_files, metadata.integrity.status
        );
    }
    Ok(())
}

fn run_backup(
    command: BackupCommand,
    install: &Installation,
    config: &CrewConfig,
    logger: &SharedLogger,
) -> anyhow::Result<()> {
    let manager = BackupManager::new(install.clone(), logger.clone());
    match command {
        BackupCommand::Create {
            description,
            compression,
            include_logs,
            no_config,
            dest,
        } => {
            let manager = match dest {
                Some(dest) => manager.with_backup_dir(dest),
                None => manager,
            };
            let mut opts = BackupOptions::from_config(&config.backup, BackupType::Manual);
            if let Some(mode) = compression {
                opts.compression = mode.parse()?;
            }
            opts.description = description;
            opts.include_logs |= include_logs;
            opts.include_config &= !no_config;
            let path = manager.create(&opts)?;
            println!("{} {}", "✓ backup created".bright_green().bold(), path.display());
        }
        BackupCommand::List => {
            let backups = manager.list_backups()?;
            if backups.is_empty() {
                println!("no backups in {}", manager.backup_dir().display());
            }
            for info in backups {
                let name = info
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                println!(
                    "  {}  {}  {:>5} files  {:>10} bytes  {}",
                    name.bold(),
                    info.metadata.created.format("%Y-%m-%d %H:%M:%S"),
                    info.file_count,
                    info.metadata.size,
                    info.metadata.backup_type
                );
            }
        }
        BackupCommand::Info { archive } => {
            let info = manager.backup_info(&resolve_archive(&manager, &archive))?;
            println!("{}", serde_json::to_string_pretty(&info.metadata)?);
            println!("files: {}", info.file_count);
        }
        BackupCommand::Restore {
            archive,
            target,
            overwrite,
        } => {
            let report = manager.restore(
                &resolve_archive(&manager, &archive),
                &RestoreOptions {
                    target_dir: target,
                    overwrite,
                },
            )?;
            println!(
                "{} {} files into {} ({} kept)",
                "✓ restored".bright_green().bold(),
                report.restored,
                report.target_dir.display(),
                report.skipped.len()
            );
        }
        BackupCommand::Verify { archive } => {
            let path = resolve_archive(&manager, &archive);
            if manager.verify(&path)? {
                println!("{} {}", "✓ checksum ok".bright_green().bold(), path.display());
            } else {
                println!("{} {}", "no checksum recorded".yellow(), path.display());
            }
        }
        BackupCommand::Cleanup { keep, max_age_days } => {
            let removed = manager.cleanup(
                keep.unwrap_or(config.backup.keep_count),
                max_age_days.unwrap_or(config.backup.max_age_days),
            )?;
            println!("removed {} backups", removed);
        }
    }
    Ok(())
}

fn run_integrity(command: IntegrityCommand, store: &MetadataStore) -> anyhow::Result<()> {
    match command {
        IntegrityCommand::Check => {
            let report = store.check_file_integrity()?;
            let status = match report.status {
                OverallStatus::Clean => report.status.to_string().green(),
                OverallStatus::Warning => report.status.to_string().yellow(),
                OverallStatus::Critical => report.status.to_string().red(),
            };
            println!(
                "{} {}: {} clean, {} modified, {} missing, {} corrupted",
                "integrity".bold(),
                status,
                report.clean,
                report.modified,
                report.missing,
                report.corrupted
            );
            for finding in &report.findings {
                println!("  {:<10} {} ({})", finding.state, finding.path, finding.component);
            }
            if report.status == OverallStatus::Critical {
                anyhow::bail!("integrity check found corrupted files");
            }
        }
        IntegrityCommand::Track { path, component } => {
            store.add_file_to_integrity_tracking(&path, &component)?;
            println!("tracking {}", path);
        }
        IntegrityCommand::Untrack { path } => {
            if store.remove_from_integrity_tracking(&path)? {
                println!("stopped tracking {}", path);
            } else {
                println!("{} was not tracked", path);
            }
        }
    }
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    let logger = TracingLogger::shared("crew");
    let install = resolve_installation(&cli)?;
    let config = config::load_config(&install)
        .with_context(|| format!("reading {}", install.config_path().display()))?;
    let store = MetadataStore::new(install.clone(), logger.clone());

    match cli.command {
        Command::Install(ref args) | Command::Update(ref args) | Command::Uninstall(ref args) => {
            run_batch(&cli.command, args, &install, &config, &logger)?;
        }
        Command::Status => run_status(&install, &config, &logger)?,
        Command::Backup(backup) => run_backup(backup.command, &install, &config, &logger)?,
        Command::Metadata(metadata) => match metadata.command {
            MetadataCommand::Refresh => {
                let m = store.refresh()?;
                println!(
                    "{} {} components, {} documents, {} files",
                    "✓ metadata refreshed".bright_green().bold(),
                    m.components.len(),
                    m.documents.len(),
                    m.installation.total_files
                );
            }
            MetadataCommand::Show => {
                println!("{}", serde_json::to_string_pretty(&store.load()?)?);
            }
            MetadataCommand::SetVersion { document, version } => {
                if !store.set_document_version(&document, &version)? {
                    anyhow::bail!("unknown document {} (run `crew metadata refresh` first)", document);
                }
                println!("{} -> {}", document, version);
            }
            MetadataCommand::FlagOutdated => {
                let installer = build_installer(&install, &config, None, &logger);
                let flagged = installer.flag_outdated()?;
                if flagged.is_empty() {
                    println!("{}", "all components current".green());
                } else {
                    println!("{} {}", "outdated:".yellow().bold(), flagged.join(", "));
                }
            }
        },
        Command::Integrity(integrity) => run_integrity(integrity.command, &store)?,
        Command::Feature(feature) => match feature.command {
            FeatureCommand::Enable {
                name,
                version,
                description,
            } => {
                store.set_feature(&name, true, &version, &description)?;
                println!("{} enabled", name);
            }
            FeatureCommand::Disable { name } => {
                store.set_feature(&name, false, "", "")?;
                println!("{} disabled", name);
            }
        },
        Command::Sync(args) => {
            let global = match &cli.dir {
                Some(dir) => Installation::new(InstallScope::Global, dir),
                None => Installation::global()?,
            };
            let project_dir = match &cli.project {
                Some(p) => p.clone(),
                None => std::env::current_dir()?,
            };
            let project = Installation::project(&project_dir);
            let report = sync_project(
                &global,
                &project,
                &SyncOptions {
                    overwrite: args.overwrite,
                    dry_run: args.dry_run,
                },
                &logger,
            )?;
            println!(
                "{} {} copied, {} unchanged, {} kept",
                "✓ sync".bright_green().bold(),
                report.copied.len(),
                report.unchanged.len(),
                report.skipped.len()
            );
            print_list("planned", &report.planned);
        }
    }
    Ok(())
}
