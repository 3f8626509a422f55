//! Per-file integrity records inside the unified metadata.
//!
//! Each tracked file keeps the hash captured when tracking started and the
//! hash seen by the most recent scan, plus an append-only audit log. A scan
//! reclassifies every record and appends one log line whenever the observed
//! content or state changes.
//!
//! Overall status precedence: any corrupted file is `critical`; otherwise any
//! modified or missing file is `warning`; otherwise `clean`.

use crate::core::checksum::{self, FileState, short_hash};
use crate::core::error::CrewError;
use crate::core::metadata::{MetadataStore, UnifiedMetadata};
use crate::core::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    #[default]
    Clean,
    Warning,
    Critical,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Clean => "clean",
            OverallStatus::Warning => "warning",
            OverallStatus::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileIntegrityMeta {
    pub original_hash: String,
    pub current_hash: String,
    pub status: FileState,
    pub component: String,
    pub tracked_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    /// Append-only audit log.
    pub modifications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IntegrityMeta {
    pub files: BTreeMap<String, FileIntegrityMeta>,
    pub total_files: usize,
    pub clean: usize,
    pub modified: usize,
    pub missing: usize,
    pub corrupted: usize,
    pub status: OverallStatus,
    pub last_check: Option<DateTime<Utc>>,
}

impl IntegrityMeta {
    fn recount(&mut self) {
        let mut counts = [0usize; 4];
        for record in self.files.values() {
            let slot = match record.status {
                FileState::Clean => 0,
                FileState::Modified => 1,
                FileState::Missing => 2,
                FileState::Corrupted => 3,
            };
            counts[slot] += 1;
        }
        self.total_files = self.files.len();
        self.clean = counts[0];
        self.modified = counts[1];
        self.missing = counts[2];
        self.corrupted = counts[3];
        self.status = overall_status(self.modified, self.missing, self.corrupted);
    }
}

pub fn overall_status(modified: usize, missing: usize, corrupted: usize) -> OverallStatus {
    if corrupted > 0 {
        OverallStatus::Critical
    } else if modified > 0 || missing > 0 {
        OverallStatus::Warning
    } else {
        OverallStatus::Clean
    }
}

/// One non-clean file found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityFinding {
    pub path: String,
    pub component: String,
    pub state: FileState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub total_files: usize,
    pub clean: usize,
    pub modified: usize,
    pub missing: usize,
    pub corrupted: usize,
    pub status: OverallStatus,
    pub findings: Vec<IntegrityFinding>,
}

fn log_line(at: &DateTime<Utc>, message: &str) -> String {
    format!("{} {}", at.to_rfc3339(), message)
}

impl UnifiedMetadata {
    /// Start tracking `rel` under `root`, capturing its current hash as the original.
    pub fn track_file(&mut self, root: &Path, rel: &str, component: &str) -> Result<(), CrewError> {
        let hash = checksum::hash_file(&root.join(rel))?;
        let now = time::now();
        let record = FileIntegrityMeta {
            original_hash: hash.clone(),
            current_hash: hash.clone(),
            status: FileState::Clean,
            component: component.to_string(),
            tracked_at: now,
            last_checked: Some(now),
            modifications: vec![log_line(
                &now,
                &format!("tracked: original {}", short_hash(&hash)),
            )],
        };
        self.integrity.files.insert(rel.to_string(), record);
        self.integrity.recount();
        Ok(())
    }

    pub fn untrack_file(&mut self, rel: &str) -> bool {
        let removed = self.integrity.files.remove(rel).is_some();
        if removed {
            self.integrity.recount();
        }
        removed
    }

    /// Re-hash every tracked file and reclassify it.
    pub fn scan_integrity(&mut self, root: &Path) -> IntegrityReport {
        let now = time::now();
        let mut findings = Vec::new();

        for (rel, record) in self.integrity.files.iter_mut() {
            let seen = checksum::observe(&root.join(rel), &record.original_hash);
            let previous_state = record.status;
            let line = match (seen.state, seen.hash.as_deref()) {
                (FileState::Modified, Some(hash)) if hash != record.current_hash
                    || previous_state != FileState::Modified =>
                {
                    Some(format!(
                        "modified: original {} -> current {}",
                        short_hash(&record.original_hash),
                        short_hash(hash)
                    ))
                }
                (FileState::Clean, _) if previous_state != FileState::Clean => Some(format!(
                    "restored: matches original {}",
                    short_hash(&record.original_hash)
                )),
                (FileState::Missing, _) if previous_state != FileState::Missing => Some(format!(
                    "missing: last seen {}",
                    short_hash(&record.current_hash)
                )),
                (FileState::Corrupted, _) if previous_state != FileState::Corrupted => {
                    Some(format!(
                        "corrupted: unreadable, last seen {}",
                        short_hash(&record.current_hash)
                    ))
                }
                _ => None,
            };
            if let Some(line) = line {
                record.modifications.push(log_line(&now, &line));
            }
            if let Some(hash) = seen.hash {
                record.current_hash = hash;
            }
            record.status = seen.state;
            record.last_checked = Some(now);
            if seen.state != FileState::Clean {
                findings.push(IntegrityFinding {
                    path: rel.clone(),
                    component: record.component.clone(),
                    state: seen.state,
                });
            }
        }

        self.integrity.recount();
        self.integrity.last_check = Some(now);
        IntegrityReport {
            total_files: self.integrity.total_files,
            clean: self.integrity.clean,
            modified: self.integrity.modified,
            missing: self.integrity.missing,
            corrupted: self.integrity.corrupted,
            status: self.integrity.status,
            findings,
        }
    }
}

impl MetadataStore {
    pub fn add_file_to_integrity_tracking(&self, rel: &str, component: &str) -> Result<(), CrewError> {
        let root = self.installation().root.clone();
        self.update(|m| m.track_file(&root, rel, component))
    }

    pub fn remove_from_integrity_tracking(&self, rel: &str) -> Result<bool, CrewError> {
        self.update(|m| Ok(m.untrack_file(rel)))
    }

    /// Scan every tracked file, persist the results and return the report.
    pub fn check_file_integrity(&self) -> Result<IntegrityReport, CrewError> {
        let root = self.installation().root.clone();
        self.update(|m| Ok(m.scan_integrity(&root)))
    }
}
