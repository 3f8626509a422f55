//! Settings-level component version registry.
//!
//! Kept beside, and independent of, the unified metadata: the metadata store
//! describes what is on disk, the registry records what the user has
//! enabled. Component operations update both; a registry failure never
//! undoes a successful file operation.

use crate::core::error::CrewError;
use crate::core::store::Installation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

pub trait VersionRegistry: Send + Sync {
    fn update_component_version(&self, name: &str, version: &str) -> Result<(), CrewError>;
    fn remove_component_registration(&self, name: &str) -> Result<(), CrewError>;
    fn component_version(&self, name: &str) -> Result<Option<String>, CrewError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettingsFile {
    pub components: BTreeMap<String, String>,
}

/// TOML-backed registry at `.crew/config/settings.toml`.
#[derive(Debug, Clone)]
pub struct SettingsRegistry {
    path: PathBuf,
}

impl SettingsRegistry {
    pub fn new(install: &Installation) -> Self {
        Self {
            path: install.settings_path(),
        }
    }

    pub fn load(&self) -> Result<SettingsFile, CrewError> {
        if !self.path.exists() {
            return Ok(SettingsFile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    fn save(&self, settings: &SettingsFile) -> Result<(), CrewError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string_pretty(settings)?)?;
        Ok(())
    }
}

impl VersionRegistry for SettingsRegistry {
    fn update_component_version(&self, name: &str, version: &str) -> Result<(), CrewError> {
        let mut settings = self.load()?;
        settings
            .components
            .insert(name.to_string(), version.to_string());
        self.save(&settings)
    }

    fn remove_component_registration(&self, name: &str) -> Result<(), CrewError> {
        let mut settings = self.load()?;
        if settings.components.remove(name).is_some() {
            self.save(&settings)?;
        }
        Ok(())
    }

    fn component_version(&self, name: &str) -> Result<Option<String>, CrewError> {
        Ok(self.load()?.components.get(name).cloned())
    }
}
