//! Installation roots and the fixed layout inside them.
//!
//! Every managed tree lives under one installation directory. Two scopes exist:
//! `Global` (user-level, shared by every project) and `Project` (a per-project
//! copy of the project-level subset). Both share the same internal layout,
//! rooted at the `.crew` utility directory.

use crate::core::error::CrewError;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Name of the framework's own dotted utility directory.
pub const UTILITY_DIR: &str = ".crew";
/// Directory name of the installation root inside a project or home dir.
pub const INSTALL_DIR_NAME: &str = ".claude";
pub const METADATA_FILE: &str = "crew-metadata.json";
pub const SETTINGS_FILE: &str = "settings.toml";
pub const CONFIG_FILE: &str = "crew.toml";

/// Installation scope discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallScope {
    /// User-level installation at `$CREW_HOME` or `~/.claude`
    Global,
    /// Project-level installation at `<project>/.claude`
    Project,
}

impl fmt::Display for InstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallScope::Global => write!(f, "global"),
            InstallScope::Project => write!(f, "project"),
        }
    }
}

/// Handle on one installation directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub scope: InstallScope,
    /// Absolute path to the installation root
    pub root: PathBuf,
}

impl Installation {
    pub fn new(scope: InstallScope, root: impl Into<PathBuf>) -> Self {
        Self {
            scope,
            root: root.into(),
        }
    }

    /// Resolve the global installation from `CREW_HOME`, falling back to `$HOME/.claude`.
    pub fn global() -> Result<Self, CrewError> {
        if let Ok(home) = std::env::var("CREW_HOME") {
            if !home.trim().is_empty() {
                return Ok(Self::new(InstallScope::Global, home));
            }
        }
        let home = std::env::var("HOME")?;
        Ok(Self::new(
            InstallScope::Global,
            PathBuf::from(home).join(INSTALL_DIR_NAME),
        ))
    }

    pub fn project(project_dir: &Path) -> Self {
        Self::new(InstallScope::Project, project_dir.join(INSTALL_DIR_NAME))
    }

    pub fn utility_dir(&self) -> PathBuf {
        self.root.join(UTILITY_DIR)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.utility_dir().join("config")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.config_dir().join(METADATA_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir().join(SETTINGS_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILE)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.utility_dir().join("backups")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.utility_dir().join("logs")
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// True when the root exists and holds at least one entry.
    pub fn has_content(&self) -> bool {
        std::fs::read_dir(&self.root)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Resolve a `/`-separated relative key against the root.
    pub fn resolve(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Express `path` relative to the root with `/` separators.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        Some(rel_key(rel))
    }
}

/// Normalize a relative path into the `/`-separated key used by metadata.
pub fn rel_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
