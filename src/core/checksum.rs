//! Content hashing and drift classification.

use crate::core::error::CrewError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use walkdir::WalkDir;

/// Length of the hash prefix used in human-readable audit lines.
pub const SHORT_HASH_LEN: usize = 8;

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Stream a file through SHA-256.
pub fn hash_file(path: &Path) -> Result<String, CrewError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

/// Size, file count and aggregate checksum of a directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirDigest {
    pub size: u64,
    pub file_count: usize,
    pub checksum: String,
}

/// Walk `dir` and fold every regular file's relative path and hash into one digest.
pub fn digest_dir(dir: &Path) -> Result<DirDigest, CrewError> {
    let mut hasher = Sha256::new();
    let mut size = 0u64;
    let mut file_count = 0usize;

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| CrewError::PathError(e.to_string()))?;
        let file_hash = hash_file(entry.path())?;
        hasher.update(crate::core::store::rel_key(rel).as_bytes());
        hasher.update([0u8]);
        hasher.update(file_hash.as_bytes());
        size += entry.metadata()?.len();
        file_count += 1;
    }

    Ok(DirDigest {
        size,
        file_count,
        checksum: format!("{:x}", hasher.finalize()),
    })
}

/// Per-file drift classification against a recorded hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    #[default]
    Clean,
    Modified,
    Missing,
    Corrupted,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileState::Clean => "clean",
            FileState::Modified => "modified",
            FileState::Missing => "missing",
            FileState::Corrupted => "corrupted",
        };
        f.write_str(s)
    }
}

/// Outcome of re-hashing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub state: FileState,
    /// Hash seen on disk; `None` when the file could not be read.
    pub hash: Option<String>,
}

/// Compare the file at `path` against `recorded`.
///
/// Stat failure means missing, read failure means corrupted.
pub fn observe(path: &Path, recorded: &str) -> Observation {
    if std::fs::metadata(path).is_err() {
        return Observation {
            state: FileState::Missing,
            hash: None,
        };
    }
    match hash_file(path) {
        Ok(hash) if hash == recorded => Observation {
            state: FileState::Clean,
            hash: Some(hash),
        },
        Ok(hash) => Observation {
            state: FileState::Modified,
            hash: Some(hash),
        },
        Err(_) => Observation {
            state: FileState::Corrupted,
            hash: None,
        },
    }
}
