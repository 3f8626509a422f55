//! User configuration loaded from `.crew/config/crew.toml`.

use crate::core::backup::CompressionMode;
use crate::core::error::CrewError;
use crate::core::store::Installation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrewConfig {
    pub backup: BackupConfig,
    pub install: InstallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackupConfig {
    /// Archive filename prefix
    pub prefix: String,
    pub compression: CompressionMode,
    /// Archives kept by `cleanup` (0 disables the count rule)
    pub keep_count: usize,
    /// Maximum archive age in days (0 disables the age rule)
    pub max_age_days: u64,
    pub include_logs: bool,
    pub include_config: bool,
    /// Snapshot the installation before install/update/uninstall batches
    pub auto_backup: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            prefix: "crew_backup".to_string(),
            compression: CompressionMode::Gzip,
            keep_count: 10,
            max_age_days: 30,
            include_logs: false,
            include_config: true,
            auto_backup: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstallConfig {
    /// Root holding one source directory per component
    pub source_dir: Option<PathBuf>,
    /// Overwrite existing targets on install
    pub overwrite: bool,
}

/// Load the installation's config; an absent file yields defaults.
pub fn load_config(install: &Installation) -> Result<CrewConfig, CrewError> {
    let path = install.config_path();
    if !path.exists() {
        return Ok(CrewConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    let config: CrewConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Component source root: `CREW_SOURCE`, then the config value, then `./templates`.
pub fn source_root(config: &CrewConfig) -> PathBuf {
    if let Ok(dir) = std::env::var("CREW_SOURCE") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    config
        .install
        .source_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("templates"))
}
