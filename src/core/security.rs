//! Pre-mutation checks on the files a component is about to write.

use crate::core::error::CrewError;
use regex::Regex;
use std::fs;
use std::path::{Component, Path};
use std::sync::OnceLock;

/// One declared source→target pair, both relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    /// Relative to the component's source directory
    pub source: String,
    /// Relative to the component's target directory
    pub target: String,
}

impl FilePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Same relative name on both sides.
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            target: name,
        }
    }
}

/// Validates a file list before anything is copied.
pub trait PathValidator: Send + Sync {
    fn validate_files(
        &self,
        files: &[FilePair],
        source_dir: &Path,
        target_dir: &Path,
    ) -> Result<(), Vec<String>>;
}

/// Rejects traversal, absolute paths, hidden or oddly named segments, and symlinked endpoints.
#[derive(Debug, Default, Clone)]
pub struct SecurityValidator;

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"))
}

/// Check one relative path; returns the reason it is unsafe.
pub fn check_relative_path(rel: &str) -> Option<String> {
    if rel.is_empty() {
        return Some("empty path".to_string());
    }
    if rel.contains('\0') || rel.chars().any(char::is_control) {
        return Some(format!("{:?}: control characters in path", rel));
    }
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                if !segment_pattern().is_match(&part) {
                    return Some(format!("{}: disallowed path segment '{}'", rel, part));
                }
            }
            Component::ParentDir => return Some(format!("{}: path traversal", rel)),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Some(format!("{}: absolute path", rel));
            }
        }
    }
    None
}

/// Resolve the deepest existing ancestor of `path` and require it under `root`.
///
/// `root` must already be canonical. Missing tail segments are fine: whatever
/// gets created there is a plain directory under an ancestor that was checked.
pub fn ensure_resolves_inside(root: &Path, path: &Path) -> Result<(), CrewError> {
    let mut existing = path;
    while fs::symlink_metadata(existing).is_err() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => return Ok(()),
        }
    }
    let escaped = || CrewError::PathTraversal(path.display().to_string());
    let resolved = fs::canonicalize(existing).map_err(|_| escaped())?;
    if !resolved.starts_with(root) {
        return Err(escaped());
    }
    Ok(())
}

pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

impl PathValidator for SecurityValidator {
    fn validate_files(
        &self,
        files: &[FilePair],
        source_dir: &Path,
        target_dir: &Path,
    ) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        for pair in files {
            if let Some(reason) = check_relative_path(&pair.source) {
                errors.push(format!("source {}", reason));
                continue;
            }
            if let Some(reason) = check_relative_path(&pair.target) {
                errors.push(format!("target {}", reason));
                continue;
            }
            let source = source_dir.join(&pair.source);
            if is_symlink(&source) {
                errors.push(format!("source {} is a symlink", source.display()));
            }
            let target = target_dir.join(&pair.target);
            if is_symlink(&target) {
                errors.push(format!("target {} is a symlink", target.display()));
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
