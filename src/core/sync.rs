//! Copy the project-level subset of a global installation into a project.
//!
//! Only markdown under `agents/` and `commands/` is project-scoped. Files that
//! already match are left alone; files that differ belong to the project and
//! are kept unless `overwrite` is set. Symlinks in the project, at the file
//! or anywhere above it, are never written through.

use crate::core::checksum;
use crate::core::error::CrewError;
use crate::core::logging::SharedLogger;
use crate::core::metadata::{InventoryKind, MetadataStore};
use crate::core::security::{check_relative_path, ensure_resolves_inside, is_symlink};
use crate::core::store::{Installation, rel_key};
use serde::Serialize;
use std::fs;
use walkdir::WalkDir;

pub const SYNC_DIRS: &[&str] = &["agents", "commands"];

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub overwrite: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub copied: Vec<String>,
    pub unchanged: Vec<String>,
    /// Differing project files left in place
    pub skipped: Vec<String>,
    /// Dry-run only
    pub planned: Vec<String>,
}

fn candidates(global: &Installation) -> Result<Vec<String>, CrewError> {
    let mut out = Vec::new();
    for dir in SYNC_DIRS {
        let base = global.root.join(dir);
        if !base.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&base).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            let is_markdown = entry.path().extension().is_some_and(|ext| ext == "md");
            if !entry.file_type().is_file() || !is_markdown {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&global.root) {
                out.push(rel_key(rel));
            }
        }
    }
    Ok(out)
}

pub fn sync_project(
    global: &Installation,
    project: &Installation,
    opts: &SyncOptions,
    logger: &SharedLogger,
) -> Result<SyncReport, CrewError> {
    if !global.exists() {
        return Err(CrewError::NotFound(format!(
            "global installation at {}",
            global.root.display()
        )));
    }

    let mut report = SyncReport::default();
    let mut created_dirs = Vec::new();
    for rel in candidates(global)? {
        if let Some(reason) = check_relative_path(&rel) {
            logger.warn(&format!("not syncing {}", reason));
            continue;
        }
        let source = global.resolve(&rel);
        let dest = project.resolve(&rel);

        if is_symlink(&dest) {
            logger.warn(&format!("not syncing {}: project path is a symlink", rel));
            report.skipped.push(rel);
            continue;
        }
        if let (Ok(root), Some(parent)) = (fs::canonicalize(&project.root), dest.parent()) {
            if let Err(e) = ensure_resolves_inside(&root, parent) {
                logger.warn(&format!("not syncing {}: {}", rel, e));
                report.skipped.push(rel);
                continue;
            }
        }

        if dest.exists() {
            if checksum::hash_file(&source)? == checksum::hash_file(&dest)? {
                report.unchanged.push(rel);
                continue;
            }
            if !opts.overwrite {
                logger.info(&format!("keeping project copy of {}", rel));
                report.skipped.push(rel);
                continue;
            }
        }
        if opts.dry_run {
            logger.info(&format!("would copy {}", rel));
            report.planned.push(rel);
            continue;
        }
        if let Some(parent) = dest.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                if let Some(dir) = project.relative(parent) {
                    created_dirs.push(dir);
                }
            }
        }
        fs::copy(&source, &dest)?;
        logger.debug(&format!("copied {}", rel));
        report.copied.push(rel);
    }

    if !report.copied.is_empty() {
        let store = MetadataStore::new(project.clone(), logger.clone());
        store.update(|m| {
            for dir in &created_dirs {
                m.add_to_inventory(dir, InventoryKind::Directory);
            }
            for rel in &report.copied {
                m.add_to_inventory(rel, InventoryKind::File);
                let component = rel.split('/').next().unwrap_or("core");
                m.track_file(&project.root, rel, component)?;
            }
            Ok(())
        })?;
    }

    logger.info(&format!(
        "synced {} into {}: {} copied, {} unchanged, {} kept",
        global.root.display(),
        project.root.display(),
        report.copied.len(),
        report.unchanged.len(),
        report.skipped.len()
    ));
    Ok(report)
}
