//! Unified metadata store.
//!
//! One JSON document per installation, at `.crew/config/crew-metadata.json`,
//! records framework and component versions, per-document version history,
//! feature flags, aggregate installation stats, the inventory of tool-created
//! paths, and per-file integrity records (see [`crate::core::integrity`]).
//!
//! Every mutation is a load → modify → save round trip. Saves go through a
//! temp file and a rename, under an advisory lock.
//!
//! Document versions are owned by explicit version bumps only: `refresh`
//! recomputes status, size and checksum from disk and carries `version` and
//! `previous_version` forward untouched, so any number of refreshes leave the
//! version history exactly as it was.

use crate::core::checksum::{self, DirDigest};
use crate::core::error::CrewError;
use crate::core::integrity::IntegrityMeta;
use crate::core::lock::FileLock;
use crate::core::logging::SharedLogger;
use crate::core::store::{Installation, rel_key};
use crate::core::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const FRAMEWORK_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_DOCUMENT_VERSION: &str = "1.0.0";

/// Component name → directory (relative to the installation root) scanned by `refresh`.
pub const COMPONENT_DIRS: &[(&str, &str)] = &[
    ("agents", "agents"),
    ("commands", "commands"),
    ("hooks", "hooks"),
];

/// Documents tracked at the installation root.
pub const CORE_DOCUMENTS: &[&str] = &["CLAUDE.md", "README.md", "CHANGELOG.md"];

/// Directories walked for markdown documents.
pub const DOCUMENT_DIRS: &[&str] = &["agents", "hooks"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Installed,
    #[default]
    Missing,
    Corrupted,
    Outdated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ComponentMeta {
    pub version: String,
    pub previous_version: String,
    pub status: ComponentStatus,
    pub size: u64,
    pub file_count: usize,
    pub checksum: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Present,
    Missing,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DocumentMeta {
    pub version: String,
    pub previous_version: String,
    pub checksum: String,
    pub size: u64,
    pub status: DocumentStatus,
    pub component: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeatureMeta {
    pub enabled: bool,
    pub version: String,
    pub description: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FrameworkMeta {
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InstallationMeta {
    pub total_size: u64,
    pub total_files: usize,
    pub install_dir: String,
    pub installed_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryKind {
    File,
    Directory,
}

/// Paths the tool itself created, relative to the installation root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Inventory {
    pub files: Vec<String>,
    pub directories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UnifiedMetadata {
    pub framework: FrameworkMeta,
    pub components: BTreeMap<String, ComponentMeta>,
    pub documents: BTreeMap<String, DocumentMeta>,
    pub features: BTreeMap<String, FeatureMeta>,
    pub installation: InstallationMeta,
    pub inventory: Inventory,
    pub integrity: IntegrityMeta,
}

fn insert_sorted(list: &mut Vec<String>, value: &str) -> bool {
    match list.binary_search_by(|item| item.as_str().cmp(value)) {
        Ok(_) => false,
        Err(pos) => {
            list.insert(pos, value.to_string());
            true
        }
    }
}

/// Owning component of a relative document path (`core` for root files).
pub fn owning_component(rel: &str) -> String {
    let first = rel.split('/').next().unwrap_or_default();
    COMPONENT_DIRS
        .iter()
        .find(|(_, dir)| *dir == first)
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| "core".to_string())
}

impl UnifiedMetadata {
    /// Freshly initialized record for `install_dir`.
    pub fn new(install_dir: &Path) -> Self {
        let now = time::now();
        Self {
            framework: FrameworkMeta {
                version: FRAMEWORK_VERSION.to_string(),
                installed_at: now,
                updated_at: now,
            },
            installation: InstallationMeta {
                install_dir: install_dir.display().to_string(),
                installed_at: now,
                last_updated: now,
                ..InstallationMeta::default()
            },
            ..Self::default()
        }
    }

    pub fn component_version(&self, name: &str) -> Option<&str> {
        self.components
            .get(name)
            .map(|c| c.version.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Record a component as installed at `version`, shifting the old version into `previous_version`.
    pub fn record_component(&mut self, name: &str, version: &str, digest: Option<DirDigest>) {
        let now = time::now();
        let entry = self.components.entry(name.to_string()).or_default();
        if !entry.version.is_empty() && entry.version != version {
            entry.previous_version = entry.version.clone();
        }
        entry.version = version.to_string();
        entry.status = ComponentStatus::Installed;
        if let Some(digest) = digest {
            entry.size = digest.size;
            entry.file_count = digest.file_count;
            entry.checksum = digest.checksum;
        }
        entry.updated_at = now;
        self.recompute_totals();
        self.installation.last_updated = now;
    }

    pub fn remove_component(&mut self, name: &str) -> Option<ComponentMeta> {
        let removed = self.components.remove(name);
        if removed.is_some() {
            self.recompute_totals();
            self.installation.last_updated = time::now();
        }
        removed
    }

    /// Recorded components whose version differs from what is available, without marking them.
    pub fn outdated_components(&self, available: &BTreeMap<String, String>) -> Vec<String> {
        self.components
            .iter()
            .filter(|(name, meta)| {
                matches!(
                    meta.status,
                    ComponentStatus::Installed | ComponentStatus::Outdated
                ) && !meta.version.is_empty()
                    && available.get(*name).is_some_and(|latest| meta.version != *latest)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Flag installed components whose recorded version differs from what is available.
    pub fn flag_outdated(&mut self, available: &BTreeMap<String, String>) -> Vec<String> {
        let mut flagged = Vec::new();
        for (name, meta) in self.components.iter_mut() {
            let Some(latest) = available.get(name) else {
                continue;
            };
            if meta.status == ComponentStatus::Installed
                && !meta.version.is_empty()
                && meta.version != *latest
            {
                meta.status = ComponentStatus::Outdated;
                flagged.push(name.clone());
            }
        }
        flagged
    }

    /// Bump a document's version. Returns false if the document is unknown.
    pub fn set_document_version(&mut self, rel: &str, version: &str) -> bool {
        let Some(doc) = self.documents.get_mut(rel) else {
            return false;
        };
        if doc.version != version {
            doc.previous_version = std::mem::take(&mut doc.version);
            doc.version = version.to_string();
            doc.updated_at = time::now();
        }
        true
    }

    pub fn set_feature(&mut self, name: &str, enabled: bool, version: &str, description: &str) {
        let feature = self.features.entry(name.to_string()).or_default();
        feature.enabled = enabled;
        if !version.is_empty() {
            feature.version = version.to_string();
        }
        if !description.is_empty() {
            feature.description = description.to_string();
        }
        feature.updated_at = time::now();
    }

    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.features.get(name).map(|f| f.enabled).unwrap_or(false)
    }

    pub fn add_to_inventory(&mut self, rel: &str, kind: InventoryKind) -> bool {
        match kind {
            InventoryKind::File => insert_sorted(&mut self.inventory.files, rel),
            InventoryKind::Directory => insert_sorted(&mut self.inventory.directories, rel),
        }
    }

    pub fn remove_from_inventory(&mut self, rel: &str) -> bool {
        let before = self.inventory.files.len() + self.inventory.directories.len();
        self.inventory.files.retain(|p| p != rel);
        self.inventory.directories.retain(|p| p != rel);
        before != self.inventory.files.len() + self.inventory.directories.len()
    }

    pub fn is_tool_owned(&self, rel: &str) -> bool {
        self.inventory.files.iter().any(|p| p == rel)
            || self.inventory.directories.iter().any(|p| p == rel)
    }

    fn recompute_totals(&mut self) {
        self.installation.total_size = self.components.values().map(|c| c.size).sum();
        self.installation.total_files = self.components.values().map(|c| c.file_count).sum();
    }

    fn refresh_components(&mut self, root: &Path, now: DateTime<Utc>) {
        for (name, dir) in COMPONENT_DIRS {
            let path = root.join(dir);
            let entry = self.components.entry(name.to_string()).or_default();
            entry.updated_at = now;
            if !path.is_dir() {
                entry.status = ComponentStatus::Missing;
                entry.size = 0;
                entry.file_count = 0;
                entry.checksum.clear();
                continue;
            }
            match checksum::digest_dir(&path) {
                Ok(digest) => {
                    if entry.status != ComponentStatus::Outdated {
                        entry.status = ComponentStatus::Installed;
                    }
                    entry.size = digest.size;
                    entry.file_count = digest.file_count;
                    entry.checksum = digest.checksum;
                }
                Err(_) => {
                    entry.status = ComponentStatus::Corrupted;
                }
            }
        }
    }

    fn refresh_documents(&mut self, root: &Path, now: DateTime<Utc>) {
        let mut seen = BTreeSet::new();
        for rel in document_candidates(root) {
            let path = root.join(&rel);
            let previous = self.documents.get(&rel).cloned();
            let mut doc = DocumentMeta {
                version: DEFAULT_DOCUMENT_VERSION.to_string(),
                component: owning_component(&rel),
                updated_at: now,
                ..DocumentMeta::default()
            };
            if let Some(prev) = &previous {
                doc.version = prev.version.clone();
                doc.previous_version = prev.previous_version.clone();
                if !prev.component.is_empty() {
                    doc.component = prev.component.clone();
                }
            }
            match (fs::metadata(&path), checksum::hash_file(&path)) {
                (Ok(meta), Ok(hash)) => {
                    doc.size = meta.len();
                    doc.status = match &previous {
                        Some(prev) if !prev.checksum.is_empty() && prev.checksum != hash => {
                            DocumentStatus::Modified
                        }
                        _ => DocumentStatus::Present,
                    };
                    doc.checksum = hash;
                }
                _ => {
                    doc.status = DocumentStatus::Missing;
                    doc.size = 0;
                    doc.checksum = previous.map(|p| p.checksum).unwrap_or_default();
                }
            }
            seen.insert(rel.clone());
            self.documents.insert(rel, doc);
        }

        for (rel, doc) in self.documents.iter_mut() {
            if !seen.contains(rel) && !root.join(rel).exists() {
                doc.status = DocumentStatus::Missing;
                doc.size = 0;
                doc.updated_at = now;
            }
        }
    }
}

/// Core documents plus every markdown file under the document directories.
fn document_candidates(root: &Path) -> Vec<String> {
    let mut out: Vec<String> = CORE_DOCUMENTS.iter().map(|s| s.to_string()).collect();
    for dir in DOCUMENT_DIRS {
        let base = root.join(dir);
        if !base.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let is_markdown = entry.path().extension().is_some_and(|ext| ext == "md");
            if !entry.file_type().is_file() || !is_markdown {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(root) {
                out.push(rel_key(rel));
            }
        }
    }
    out
}

/// File-backed handle on one installation's unified metadata.
#[derive(Clone)]
pub struct MetadataStore {
    install: Installation,
    logger: SharedLogger,
}

impl MetadataStore {
    pub fn new(install: Installation, logger: SharedLogger) -> Self {
        Self { install, logger }
    }

    pub fn installation(&self) -> &Installation {
        &self.install
    }

    pub fn path(&self) -> PathBuf {
        self.install.metadata_path()
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path().into_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Load the record; absent means a fresh empty one, unparsable is an error.
    pub fn load(&self) -> Result<UnifiedMetadata, CrewError> {
        let path = self.path();
        if !path.exists() {
            return Ok(UnifiedMetadata::new(&self.install.root));
        }
        let content = fs::read_to_string(&path)?;
        let metadata: UnifiedMetadata = serde_json::from_str(&content)?;
        Ok(metadata)
    }

    pub fn save(&self, metadata: &UnifiedMetadata) -> Result<(), CrewError> {
        let _lock = FileLock::acquire(&self.lock_path())?;
        self.write(metadata)
    }

    fn write(&self, metadata: &UnifiedMetadata) -> Result<(), CrewError> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(metadata)?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Locked load → modify → save cycle.
    pub fn update<F, R>(&self, f: F) -> Result<R, CrewError>
    where
        F: FnOnce(&mut UnifiedMetadata) -> Result<R, CrewError>,
    {
        let _lock = FileLock::acquire(&self.lock_path())?;
        let mut metadata = self.load()?;
        let out = f(&mut metadata)?;
        self.write(&metadata)?;
        Ok(out)
    }

    /// Reconcile the record with what is on disk and persist it.
    pub fn refresh(&self) -> Result<UnifiedMetadata, CrewError> {
        let root = self.install.root.clone();
        let metadata = self.update(|m| {
            let now = time::now();
            m.installation.install_dir = root.display().to_string();
            m.installation.last_updated = now;
            m.framework.updated_at = now;
            if m.framework.version.is_empty() {
                m.framework.version = FRAMEWORK_VERSION.to_string();
            }
            m.refresh_components(&root, now);
            m.refresh_documents(&root, now);
            m.recompute_totals();
            Ok(m.clone())
        })?;
        self.logger.info(&format!(
            "metadata refreshed: {} components, {} documents",
            metadata.components.len(),
            metadata.documents.len()
        ));
        Ok(metadata)
    }

    /// Record `name@version`, digesting `target_dir` when it exists.
    pub fn record_component(
        &self,
        name: &str,
        version: &str,
        target_dir: &Path,
    ) -> Result<(), CrewError> {
        let digest = if target_dir.is_dir() {
            Some(checksum::digest_dir(target_dir)?)
        } else {
            None
        };
        self.update(|m| {
            m.record_component(name, version, digest);
            Ok(())
        })
    }

    pub fn remove_component(&self, name: &str) -> Result<bool, CrewError> {
        self.update(|m| Ok(m.remove_component(name).is_some()))
    }

    pub fn component_version(&self, name: &str) -> Result<Option<String>, CrewError> {
        Ok(self.load()?.component_version(name).map(str::to_string))
    }

    pub fn set_document_version(&self, rel: &str, version: &str) -> Result<bool, CrewError> {
        self.update(|m| Ok(m.set_document_version(rel, version)))
    }

    pub fn set_feature(
        &self,
        name: &str,
        enabled: bool,
        version: &str,
        description: &str,
    ) -> Result<(), CrewError> {
        self.update(|m| {
            m.set_feature(name, enabled, version, description);
            Ok(())
        })
    }

    pub fn add_to_inventory(&self, rel: &str, kind: InventoryKind) -> Result<bool, CrewError> {
        self.update(|m| Ok(m.add_to_inventory(rel, kind)))
    }

    pub fn remove_from_inventory(&self, rel: &str) -> Result<bool, CrewError> {
        self.update(|m| Ok(m.remove_from_inventory(rel)))
    }
}
