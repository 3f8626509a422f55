//! Batch install/update/uninstall over a registry of components.
//!
//! A batch is best-effort: an unknown name or a failing component is recorded
//! and the batch moves on. Nothing done by a component that succeeded is ever
//! undone because a later one failed.

use crate::core::backup::{BackupManager, BackupOptions, BackupType};
use crate::core::component::{Component, ComponentConfig, ComponentSpec};
use crate::core::error::CrewError;
use crate::core::logging::SharedLogger;
use crate::core::metadata::MetadataStore;
use crate::core::store::Installation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Optional post-install check carried by a registry entry.
pub type InstallationCheck = fn(&ComponentSpec, &Installation) -> Result<(), Vec<String>>;

pub struct RegistryEntry {
    pub component: Box<dyn Component>,
    pub validate_installation: Option<InstallationCheck>,
}

/// Components by name, in registration order.
#[derive(Default)]
pub struct ComponentRegistry {
    entries: Vec<RegistryEntry>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component; a later registration under the same name replaces the earlier one.
    pub fn register(
        &mut self,
        component: Box<dyn Component>,
        validate_installation: Option<InstallationCheck>,
    ) {
        let entry = RegistryEntry {
            component,
            validate_installation,
        };
        match self
            .entries
            .iter()
            .position(|e| e.component.name() == entry.component.name())
        {
            Some(i) => self.entries[i] = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.component.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.component.name().to_string())
            .collect()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupPolicy {
    /// Back up when the installation already has content
    #[default]
    Auto,
    /// Back up whenever the installation directory exists
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Update,
    Uninstall,
}

impl Operation {
    fn backup_type(&self) -> BackupType {
        match self {
            Operation::Install => BackupType::PreInstall,
            Operation::Update => BackupType::PreUpdate,
            Operation::Uninstall => BackupType::PreUninstall,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Install => "install",
            Operation::Update => "update",
            Operation::Uninstall => "uninstall",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dry_run: bool,
    pub overwrite: bool,
    pub backup: BackupPolicy,
    pub backup_options: BackupOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            overwrite: false,
            backup: BackupPolicy::Auto,
            backup_options: BackupOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub component: String,
    pub passed: bool,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub installed: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    /// Dry-run only: what would have been done
    pub planned: Vec<String>,
    pub failed: Vec<String>,
    /// Failure reason per failed component
    pub errors: BTreeMap<String, String>,
    pub backup_path: Option<PathBuf>,
    pub checks: Vec<CheckOutcome>,
}

impl BatchReport {
    fn fail(&mut self, name: &str, reason: String) {
        self.failed.push(name.to_string());
        self.errors.insert(name.to_string(), reason);
    }
}

/// One row of `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentState {
    pub name: String,
    pub description: String,
    pub available_version: String,
    pub installed_version: Option<String>,
    pub installed: bool,
}

pub struct Installer {
    install: Installation,
    registry: ComponentRegistry,
    backups: BackupManager,
    logger: SharedLogger,
}

impl Installer {
    pub fn new(install: Installation, registry: ComponentRegistry, logger: SharedLogger) -> Self {
        let backups = BackupManager::new(install.clone(), logger.clone());
        Self {
            install,
            registry,
            backups,
            logger,
        }
    }

    pub fn with_backup_manager(mut self, backups: BackupManager) -> Self {
        self.backups = backups;
        self
    }

    pub fn installation(&self) -> &Installation {
        &self.install
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Single lookup outside a batch; unknown names are an error here.
    pub fn component(&self, name: &str) -> Result<&dyn Component, CrewError> {
        self.registry
            .get(name)
            .map(|e| e.component.as_ref())
            .ok_or_else(|| CrewError::NotFound(format!("component '{}'", name)))
    }

    pub fn install_components(&self, names: &[String], opts: &BatchOptions) -> BatchReport {
        self.run_batch(Operation::Install, names, opts)
    }

    pub fn update_components(&self, names: &[String], opts: &BatchOptions) -> BatchReport {
        self.run_batch(Operation::Update, names, opts)
    }

    /// Components are removed in reverse of the given order.
    pub fn uninstall_components(&self, names: &[String], opts: &BatchOptions) -> BatchReport {
        self.run_batch(Operation::Uninstall, names, opts)
    }

    fn pre_operation_backup(&self, op: Operation, opts: &BatchOptions) -> Option<PathBuf> {
        let wanted = match opts.backup {
            BackupPolicy::Never => false,
            BackupPolicy::Auto => self.install.has_content(),
            BackupPolicy::Always => self.install.exists(),
        };
        if !wanted {
            return None;
        }
        if opts.dry_run {
            self.logger.info(&format!("would back up {}", self.install.root.display()));
            return None;
        }
        let mut backup_options = opts.backup_options.clone();
        backup_options.backup_type = op.backup_type();
        if backup_options.description.is_none() {
            backup_options.description = Some(format!("before {}", op));
        }
        match self.backups.create(&backup_options) {
            Ok(path) => Some(path),
            Err(e) => {
                self.logger.warn(&format!(
                    "pre-{} backup failed, continuing without one: {}",
                    op, e
                ));
                None
            }
        }
    }

    fn run_batch(&self, op: Operation, names: &[String], opts: &BatchOptions) -> BatchReport {
        let mut report = BatchReport {
            backup_path: self.pre_operation_backup(op, opts),
            ..BatchReport::default()
        };
        let ordered: Vec<&String> = match op {
            Operation::Uninstall => names.iter().rev().collect(),
            Operation::Install | Operation::Update => names.iter().collect(),
        };
        let config = ComponentConfig {
            overwrite: opts.overwrite,
        };

        for name in ordered {
            let Some(entry) = self.registry.get(name) else {
                self.logger.error(&format!("component '{}' not found", name));
                report.fail(name, "not found".to_string());
                continue;
            };
            let component = entry.component.as_ref();

            if opts.dry_run {
                self.logger.info(&format!(
                    "would {} {} {}",
                    op,
                    name,
                    component.version()
                ));
                report.planned.push(name.clone());
                continue;
            }

            if op != Operation::Uninstall {
                let prereqs = component.validate_prerequisites(&self.install);
                if !prereqs.ok {
                    self.logger.error(&format!(
                        "{}: prerequisites not met: {}",
                        name,
                        prereqs.reasons.join("; ")
                    ));
                    report.fail(name, prereqs.reasons.join("; "));
                    continue;
                }
            }

            let result = match op {
                Operation::Install => component.install(&self.install, &config),
                Operation::Update => component.update(&self.install, &config),
                Operation::Uninstall => component.uninstall(&self.install, &config),
            };
            match result {
                Ok(_) => match op {
                    Operation::Install => report.installed.push(name.clone()),
                    Operation::Update => report.updated.push(name.clone()),
                    Operation::Uninstall => report.removed.push(name.clone()),
                },
                Err(e) => {
                    self.logger.error(&format!("{} {} failed: {}", op, name, e));
                    report.fail(name, e.to_string());
                }
            }
        }

        if op == Operation::Install && !opts.dry_run && !report.installed.is_empty() {
            report.checks = self.validate_installation(&report.installed);
        }
        report.success = report.failed.is_empty();
        report
    }

    /// Run the optional installation check of each named component that has one.
    pub fn validate_installation(&self, names: &[String]) -> Vec<CheckOutcome> {
        let mut out = Vec::new();
        for name in names {
            let Some(entry) = self.registry.get(name) else {
                continue;
            };
            let Some(check) = entry.validate_installation else {
                continue;
            };
            let outcome = match check(entry.component.spec(), &self.install) {
                Ok(()) => {
                    self.logger.info(&format!("{}: installation check passed", name));
                    CheckOutcome {
                        component: name.clone(),
                        passed: true,
                        problems: Vec::new(),
                    }
                }
                Err(problems) => {
                    self.logger.warn(&format!(
                        "{}: installation check failed: {}",
                        name,
                        problems.join("; ")
                    ));
                    CheckOutcome {
                        component: name.clone(),
                        passed: false,
                        problems,
                    }
                }
            };
            out.push(outcome);
        }
        out
    }

    pub fn status(&self) -> Vec<ComponentState> {
        self.registry
            .entries()
            .iter()
            .map(|e| {
                let component = e.component.as_ref();
                let installed_version = component
                    .installed_version(&self.install)
                    .unwrap_or_else(|err| {
                        self.logger
                            .warn(&format!("{}: cannot read version: {}", component.name(), err));
                        None
                    });
                ComponentState {
                    name: component.name().to_string(),
                    description: component.spec().description.clone(),
                    available_version: component.version().to_string(),
                    installed_version,
                    installed: component.is_installed(&self.install),
                }
            })
            .collect()
    }

    fn available_versions(&self) -> BTreeMap<String, String> {
        self.registry
            .entries()
            .iter()
            .map(|e| (e.component.name().to_string(), e.component.version().to_string()))
            .collect()
    }

    /// Components whose recorded version differs from the registry's. Read-only.
    pub fn outdated(&self) -> Result<Vec<String>, CrewError> {
        let store = MetadataStore::new(self.install.clone(), self.logger.clone());
        Ok(store.load()?.outdated_components(&self.available_versions()))
    }

    /// Mark recorded components whose version differs from the registry's as outdated.
    pub fn flag_outdated(&self) -> Result<Vec<String>, CrewError> {
        let available = self.available_versions();
        let store = MetadataStore::new(self.install.clone(), self.logger.clone());
        let flagged = store.update(|m| Ok(m.flag_outdated(&available)))?;
        for name in &flagged {
            self.logger.warn(&format!("{} is outdated", name));
        }
        Ok(flagged)
    }
}
