//! Archive snapshots of an installation directory.
//!
//! An archive is a POSIX tar file, optionally gzip or bzip2 compressed, whose first
//! member is `backup_metadata.json`. Every other member is a regular file
//! stored under its path relative to the installation root, with its mode
//! and mtime preserved.
//!
//! The archive checksum and size can only be known after the archive is
//! closed, so they live in the `{archive}.meta` sidecar. The embedded copy of
//! the metadata always carries `size = 0` and an empty checksum; the sidecar
//! is the sole authority for both. Restores fall back to the embedded copy
//! only when the sidecar is gone, and then skip checksum verification.

use crate::core::checksum;
use crate::core::config::BackupConfig;
use crate::core::error::CrewError;
use crate::core::lock::FileLock;
use crate::core::logging::SharedLogger;
use crate::core::metadata::{FRAMEWORK_VERSION, MetadataStore};
use crate::core::security::ensure_resolves_inside;
use crate::core::store::{Installation, UTILITY_DIR, rel_key};
use crate::core::time;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::UNIX_EPOCH;
use tar::{EntryType, Header};
use walkdir::WalkDir;

pub const METADATA_MEMBER: &str = "backup_metadata.json";
pub const SIDECAR_SUFFIX: &str = ".meta";
pub const BACKUP_FORMAT_VERSION: &str = "1.0";
const LOCK_FILE: &str = ".crew-backup.lock";
const TEMP_SUFFIXES: &[&str] = &[
    ".tmp", ".temp", ".bak", ".backup", ".swp", ".partial", ".lock", "~",
];
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const MAX_DESCRIPTION_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    None,
    #[default]
    Gzip,
    Bzip2,
}

impl CompressionMode {
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionMode::None => ".tar",
            CompressionMode::Gzip => ".tar.gz",
            CompressionMode::Bzip2 => ".tar.bz2",
        }
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompressionMode::None => "none",
            CompressionMode::Gzip => "gzip",
            CompressionMode::Bzip2 => "bzip2",
        };
        f.write_str(s)
    }
}

impl FromStr for CompressionMode {
    type Err = CrewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionMode::None),
            "gzip" | "gz" => Ok(CompressionMode::Gzip),
            "bzip2" | "bz2" => Ok(CompressionMode::Bzip2),
            other => Err(CrewError::ValidationError(format!(
                "unknown compression mode '{}' (expected none, gzip or bzip2)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    #[default]
    Manual,
    PreInstall,
    PreUpdate,
    PreUninstall,
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupType::Manual => "manual",
            BackupType::PreInstall => "pre_install",
            BackupType::PreUpdate => "pre_update",
            BackupType::PreUninstall => "pre_uninstall",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub backup_version: String,
    pub created: DateTime<Utc>,
    /// Unix seconds of `created`
    pub timestamp: i64,
    pub install_dir: String,
    pub components: BTreeMap<String, String>,
    pub framework_version: String,
    pub size: u64,
    pub checksum: String,
    pub backup_type: BackupType,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub prefix: String,
    pub compression: CompressionMode,
    pub description: Option<String>,
    pub include_logs: bool,
    pub include_config: bool,
    pub backup_type: BackupType,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self::from_config(&BackupConfig::default(), BackupType::Manual)
    }
}

impl BackupOptions {
    pub fn from_config(config: &BackupConfig, backup_type: BackupType) -> Self {
        Self {
            prefix: config.prefix.clone(),
            compression: config.compression,
            description: None,
            include_logs: config.include_logs,
            include_config: config.include_config,
            backup_type,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Restore here instead of the manager's installation root
    pub target_dir: Option<PathBuf>,
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub target_dir: PathBuf,
    pub restored: usize,
    /// Relative paths left alone because they already existed
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub metadata: BackupMetadata,
    pub file_count: usize,
}

/// Decides which installation paths go into an archive.
#[derive(Debug, Clone)]
pub struct ArchiveFilter {
    pub include_logs: bool,
    pub include_config: bool,
    /// Relative subtrees never archived (the backups directory)
    pub excluded: Vec<String>,
}

fn under(rel: &str, prefix: &str) -> bool {
    rel == prefix
        || rel
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl ArchiveFilter {
    pub fn admits(&self, rel: &str, is_dir: bool) -> bool {
        for (i, part) in rel.split('/').enumerate() {
            if part.starts_with('.') && !(i == 0 && part == UTILITY_DIR) {
                return false;
            }
        }
        if self.excluded.iter().any(|e| under(rel, e)) {
            return false;
        }
        let logs_dir = format!("{}/logs", UTILITY_DIR);
        if !self.include_logs && (under(rel, &logs_dir) || (!is_dir && rel.ends_with(".log"))) {
            return false;
        }
        let config_dir = format!("{}/config", UTILITY_DIR);
        if !self.include_config && under(rel, &config_dir) {
            return false;
        }
        if !is_dir && TEMP_SUFFIXES.iter().any(|s| rel.ends_with(s)) {
            return false;
        }
        true
    }
}

fn description_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("valid regex"))
}

/// Reduce a free-form description to a filename-safe fragment.
pub fn sanitize_description(description: &str) -> String {
    let replaced = description_pattern().replace_all(description.trim(), "_");
    let trimmed = replaced.trim_matches('_');
    trimmed.chars().take(MAX_DESCRIPTION_LEN).collect::<String>()
}

/// `{prefix}_{YYYYMMDD_HHMMSS}[_{description}]{ext}`
pub fn archive_file_name(
    prefix: &str,
    at: &DateTime<Utc>,
    description: Option<&str>,
    compression: CompressionMode,
) -> String {
    let mut name = format!("{}_{}", prefix, time::file_stamp(at));
    if let Some(desc) = description.map(sanitize_description) {
        if !desc.is_empty() {
            name.push('_');
            name.push_str(&desc);
        }
    }
    name.push_str(compression.extension());
    name
}

pub fn sidecar_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

pub fn is_archive_path(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    [".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

/// Relative form of an archive member path; anything that could leave the root is rejected.
fn safe_member_path(raw: &Path) -> Result<PathBuf, CrewError> {
    let mut out = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(CrewError::PathTraversal(raw.display().to_string()));
            }
        }
    }
    Ok(out)
}

/// Compression is detected from the leading bytes, not the file name.
fn open_archive(path: &Path) -> Result<tar::Archive<Box<dyn Read>>, CrewError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 3];
    let mut read = 0usize;
    while read < magic.len() {
        match file.read(&mut magic[read..])? {
            0 => break,
            n => read += n,
        }
    }
    let magic = &magic[..read];
    file.seek(SeekFrom::Start(0))?;
    let reader: Box<dyn Read> = if magic.starts_with(GZIP_MAGIC) {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else if magic.starts_with(BZIP2_MAGIC) {
        Box::new(BzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(tar::Archive::new(reader))
}

fn finish_file(writer: BufWriter<File>) -> Result<(), CrewError> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o644 }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<(), CrewError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<(), CrewError> {
    Ok(())
}

fn mtime_secs(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Creates, inspects, restores and prunes archives of one installation.
#[derive(Clone)]
pub struct BackupManager {
    install: Installation,
    backup_dir: PathBuf,
    logger: SharedLogger,
}

impl BackupManager {
    pub fn new(install: Installation, logger: SharedLogger) -> Self {
        let backup_dir = install.backups_dir();
        Self {
            install,
            backup_dir,
            logger,
        }
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn installation(&self) -> &Installation {
        &self.install
    }

    fn filter_for(&self, opts: &BackupOptions) -> ArchiveFilter {
        let mut excluded = vec![rel_key(Path::new(&format!("{}/backups", UTILITY_DIR)))];
        if let Some(rel) = self.install.relative(&self.backup_dir) {
            if !rel.is_empty() && !excluded.contains(&rel) {
                excluded.push(rel);
            }
        }
        ArchiveFilter {
            include_logs: opts.include_logs,
            include_config: opts.include_config,
            excluded,
        }
    }

    fn next_archive_path(
        &self,
        opts: &BackupOptions,
        at: &DateTime<Utc>,
        compression: CompressionMode,
    ) -> PathBuf {
        let name = archive_file_name(&opts.prefix, at, opts.description.as_deref(), compression);
        let candidate = self.backup_dir.join(&name);
        if !candidate.exists() && !sidecar_path(&candidate).exists() {
            return candidate;
        }
        let stem = name.trim_end_matches(compression.extension());
        let mut n = 1usize;
        loop {
            let candidate = self
                .backup_dir
                .join(format!("{}_{}{}", stem, n, compression.extension()));
            if !candidate.exists() && !sidecar_path(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }

    fn installed_versions(&self) -> (BTreeMap<String, String>, String) {
        let store = MetadataStore::new(self.install.clone(), self.logger.clone());
        match store.load() {
            Ok(m) => {
                let components = m
                    .components
                    .iter()
                    .filter(|(_, c)| !c.version.is_empty())
                    .map(|(name, c)| (name.clone(), c.version.clone()))
                    .collect();
                let framework = if m.framework.version.is_empty() {
                    FRAMEWORK_VERSION.to_string()
                } else {
                    m.framework.version
                };
                (components, framework)
            }
            Err(e) => {
                self.logger.warn(&format!(
                    "could not read installation metadata for backup record: {}",
                    e
                ));
                (BTreeMap::new(), FRAMEWORK_VERSION.to_string())
            }
        }
    }

    /// Snapshot the installation; returns the archive path.
    pub fn create(&self, opts: &BackupOptions) -> Result<PathBuf, CrewError> {
        let root = &self.install.root;
        if !root.is_dir() {
            return Err(CrewError::NotFound(format!(
                "installation directory {}",
                root.display()
            )));
        }
        fs::create_dir_all(&self.backup_dir)?;
        let _lock = FileLock::acquire(&self.backup_dir.join(LOCK_FILE))?;

        let compression = opts.compression;
        let created = time::now();
        let archive_path = self.next_archive_path(opts, &created, compression);
        let (components, framework_version) = self.installed_versions();
        let mut metadata = BackupMetadata {
            backup_version: BACKUP_FORMAT_VERSION.to_string(),
            created,
            timestamp: time::epoch_secs(&created),
            install_dir: root.display().to_string(),
            components,
            framework_version,
            size: 0,
            checksum: String::new(),
            backup_type: opts.backup_type,
            description: opts.description.clone().unwrap_or_default(),
        };
        let filter = self.filter_for(opts);

        let writer = BufWriter::new(File::create(&archive_path)?);
        let file_count = match compression {
            CompressionMode::Gzip => {
                let mut builder =
                    tar::Builder::new(GzEncoder::new(writer, Compression::default()));
                let count = self.append_members(&mut builder, &metadata, &filter)?;
                let encoder = builder.into_inner()?;
                finish_file(encoder.finish()?)?;
                count
            }
            CompressionMode::Bzip2 => {
                let mut builder =
                    tar::Builder::new(BzEncoder::new(writer, bzip2::Compression::default()));
                let count = self.append_members(&mut builder, &metadata, &filter)?;
                let encoder = builder.into_inner()?;
                finish_file(encoder.finish()?)?;
                count
            }
            CompressionMode::None => {
                let mut builder = tar::Builder::new(writer);
                let count = self.append_members(&mut builder, &metadata, &filter)?;
                finish_file(builder.into_inner()?)?;
                count
            }
        };

        metadata.checksum = checksum::hash_file(&archive_path)?;
        metadata.size = fs::metadata(&archive_path)?.len();
        fs::write(
            sidecar_path(&archive_path),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        self.logger.info(&format!(
            "backup created: {} ({} files, {} bytes, {})",
            archive_path.display(),
            file_count,
            metadata.size,
            compression
        ));
        Ok(archive_path)
    }

    fn append_members<W: Write>(
        &self,
        builder: &mut tar::Builder<W>,
        metadata: &BackupMetadata,
        filter: &ArchiveFilter,
    ) -> Result<usize, CrewError> {
        let json = serde_json::to_vec_pretty(metadata)?;
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(json.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(u64::try_from(metadata.timestamp).unwrap_or(0));
        builder.append_data(&mut header, METADATA_MEMBER, json.as_slice())?;

        let root = &self.install.root;
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                entry
                    .path()
                    .strip_prefix(root)
                    .map(|rel| filter.admits(&rel_key(rel), entry.file_type().is_dir()))
                    .unwrap_or(false)
            });

        let mut count = 0usize;
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| CrewError::PathError(e.to_string()))?;
            let rel = rel_key(rel);
            let meta = entry.metadata()?;
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(meta.len());
            header.set_mode(file_mode(&meta));
            header.set_mtime(mtime_secs(&meta));
            let file = File::open(entry.path())?;
            builder.append_data(&mut header, &rel, BufReader::new(file))?;
            count += 1;
        }
        Ok(count)
    }

    fn read_embedded_metadata(&self, archive: &Path) -> Result<BackupMetadata, CrewError> {
        let mut reader = open_archive(archive)?;
        for entry in reader.entries()? {
            let mut entry = entry?;
            if &*entry.path()? == Path::new(METADATA_MEMBER) {
                let mut json = String::new();
                entry.read_to_string(&mut json)?;
                return Ok(serde_json::from_str(&json)?);
            }
        }
        Err(CrewError::NotFound(format!(
            "{} in {}",
            METADATA_MEMBER,
            archive.display()
        )))
    }

    /// Sidecar metadata when present, otherwise the embedded copy.
    pub fn load_metadata(&self, archive: &Path) -> Result<BackupMetadata, CrewError> {
        let sidecar = sidecar_path(archive);
        if sidecar.exists() {
            let content = fs::read_to_string(&sidecar)?;
            return Ok(serde_json::from_str(&content)?);
        }
        self.logger.debug(&format!(
            "no sidecar for {}; reading embedded metadata",
            archive.display()
        ));
        self.read_embedded_metadata(archive)
    }

    /// Number of members other than the metadata entry, by full header scan.
    pub fn count_files(&self, archive: &Path) -> Result<usize, CrewError> {
        let mut reader = open_archive(archive)?;
        let mut count = 0usize;
        for entry in reader.entries()? {
            let entry = entry?;
            if &*entry.path()? != Path::new(METADATA_MEMBER) {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn backup_info(&self, archive: &Path) -> Result<BackupInfo, CrewError> {
        if !archive.is_file() {
            return Err(CrewError::NotFound(format!("backup {}", archive.display())));
        }
        Ok(BackupInfo {
            path: archive.to_path_buf(),
            metadata: self.load_metadata(archive)?,
            file_count: self.count_files(archive)?,
        })
    }

    fn check_checksum(&self, archive: &Path, expected: &str) -> Result<(), CrewError> {
        let actual = checksum::hash_file(archive)?;
        if actual != expected {
            return Err(CrewError::ChecksumMismatch {
                path: archive.display().to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Re-hash the archive against its recorded checksum.
    ///
    /// `Ok(false)` means no checksum was recorded; a mismatch is an error.
    pub fn verify(&self, archive: &Path) -> Result<bool, CrewError> {
        let metadata = self.load_metadata(archive)?;
        if metadata.checksum.is_empty() {
            return Ok(false);
        }
        self.check_checksum(archive, &metadata.checksum)?;
        Ok(true)
    }

    /// Validate every member path before anything is written.
    ///
    /// Lexical escapes are rejected outright. When the target already exists,
    /// each member's directory must also resolve inside it, so a symlinked
    /// directory in the target cannot redirect extraction.
    fn prescan_members(&self, archive: &Path, target: &Path) -> Result<usize, CrewError> {
        let root = match fs::canonicalize(target) {
            Ok(root) => Some(root),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let mut reader = open_archive(archive)?;
        let mut count = 0usize;
        for entry in reader.entries()? {
            let entry = entry?;
            let rel = safe_member_path(&entry.path()?)?;
            if let Some(root) = &root {
                let dest = root.join(&rel);
                let dir = if entry.header().entry_type().is_dir() {
                    dest.as_path()
                } else {
                    dest.parent().unwrap_or(root)
                };
                ensure_resolves_inside(root, dir)?;
            }
            count += 1;
        }
        Ok(count)
    }

    pub fn restore(&self, archive: &Path, opts: &RestoreOptions) -> Result<RestoreReport, CrewError> {
        if !archive.is_file() {
            return Err(CrewError::NotFound(format!("backup {}", archive.display())));
        }
        let metadata = self.load_metadata(archive)?;
        if metadata.checksum.is_empty() {
            self.logger.warn(&format!(
                "no checksum recorded for {}; restoring unverified",
                archive.display()
            ));
        } else {
            self.check_checksum(archive, &metadata.checksum)?;
        }
        let target = opts
            .target_dir
            .clone()
            .unwrap_or_else(|| self.install.root.clone());
        self.prescan_members(archive, &target)?;
        fs::create_dir_all(&target)?;
        let root = fs::canonicalize(&target)?;

        let mut restored = 0usize;
        let mut skipped = Vec::new();
        let mut reader = open_archive(archive)?;
        for entry in reader.entries()? {
            let mut entry = entry?;
            let rel = safe_member_path(&entry.path()?)?;
            let key = rel_key(&rel);
            if key.is_empty() || key == METADATA_MEMBER {
                continue;
            }
            let dest = root.join(&rel);
            let kind = entry.header().entry_type();
            if kind.is_dir() {
                ensure_resolves_inside(&root, &dest)?;
                fs::create_dir_all(&dest)?;
                continue;
            }
            if !kind.is_file() {
                self.logger
                    .warn(&format!("skipping non-regular archive member {}", key));
                skipped.push(key);
                continue;
            }
            if let Some(parent) = dest.parent() {
                ensure_resolves_inside(&root, parent)?;
                fs::create_dir_all(parent)?;
            }
            if let Ok(existing) = fs::symlink_metadata(&dest) {
                if !opts.overwrite {
                    self.logger
                        .info(&format!("skipping existing file {}", dest.display()));
                    skipped.push(key);
                    continue;
                }
                if existing.file_type().is_symlink() {
                    fs::remove_file(&dest)?;
                }
            }
            let mode = entry.header().mode().unwrap_or(0o644);
            let mut out = BufWriter::new(File::create(&dest)?);
            io::copy(&mut entry, &mut out)?;
            out.flush()?;
            drop(out);
            apply_mode(&dest, mode)?;
            restored += 1;
        }

        self.logger.info(&format!(
            "restored {} files from {} into {} ({} skipped)",
            restored,
            archive.display(),
            root.display(),
            skipped.len()
        ));
        Ok(RestoreReport {
            target_dir: root,
            restored,
            skipped,
        })
    }

    /// Archives in the backup directory, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, CrewError> {
        if !self.backup_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            if !path.is_file() || !is_archive_path(&path) {
                continue;
            }
            match self.backup_info(&path) {
                Ok(info) => out.push(info),
                Err(e) => self
                    .logger
                    .warn(&format!("unreadable backup {}: {}", path.display(), e)),
            }
        }
        // `created` keeps sub-second precision; archives made within one
        // second carry `_N` suffixes that do not sort as strings.
        out.sort_by(|a, b| {
            b.metadata
                .created
                .cmp(&a.metadata.created)
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(out)
    }

    /// Remove archives older than `max_age_days` or beyond the `keep_count` newest.
    ///
    /// A zero disables the corresponding rule. Returns the number of archives removed.
    pub fn cleanup(&self, keep_count: usize, max_age_days: u64) -> Result<usize, CrewError> {
        let backups = self.list_backups()?;
        let now = time::now();
        let mut doomed = BTreeSet::new();

        if max_age_days > 0 {
            let limit = i64::try_from(max_age_days).unwrap_or(i64::MAX);
            for info in &backups {
                if time::age_days(&info.metadata.created, &now) >= limit {
                    doomed.insert(info.path.clone());
                }
            }
        }
        if keep_count > 0 && backups.len() > keep_count {
            for info in &backups[keep_count..] {
                doomed.insert(info.path.clone());
            }
        }

        let mut removed = 0usize;
        for path in doomed {
            if let Err(e) = fs::remove_file(&path) {
                self.logger
                    .warn(&format!("failed to remove {}: {}", path.display(), e));
                continue;
            }
            removed += 1;
            let sidecar = sidecar_path(&path);
            if sidecar.exists() {
                if let Err(e) = fs::remove_file(&sidecar) {
                    self.logger
                        .warn(&format!("failed to remove {}: {}", sidecar.display(), e));
                }
            }
            self.logger.info(&format!("removed backup {}", path.display()));
        }
        Ok(removed)
    }
}
