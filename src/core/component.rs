//! File-based component lifecycle.
//!
//! A component is a named, versioned set of source→target file pairs copied
//! from a template source tree into one directory of an installation. The
//! shared behaviour lives in [`FileComponent`]; concrete components in
//! `plugins` wrap it and implement [`Component`], overriding only what they
//! need.
//!
//! Nothing is rolled back on partial failure. Files that were copied stay on
//! disk and the pre-operation archive is the recovery path.

use crate::core::checksum;
use crate::core::error::CrewError;
use crate::core::logging::SharedLogger;
use crate::core::metadata::{InventoryKind, MetadataStore};
use crate::core::security::{FilePair, PathValidator, SecurityValidator, check_relative_path};
use crate::core::settings::{SettingsRegistry, VersionRegistry};
use crate::core::store::{Installation, rel_key};
use crate::core::time;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A component that must already be present, detected by marker files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    /// Paths relative to the installation root; any one present satisfies the dependency
    pub markers: Vec<String>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, markers: &[&str]) -> Self {
        Self {
            name: name.into(),
            markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Static description of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub name: String,
    pub version: String,
    pub description: String,
    pub category: String,
    pub dependencies: Vec<Dependency>,
    /// Relative to the context's source root
    pub source_subdir: String,
    /// Relative to the installation root
    pub target_subdir: String,
    pub files: Vec<FilePair>,
    /// Installed-state markers, relative to the installation root
    pub markers: Vec<String>,
    /// Permission bits applied after each copy
    pub file_mode: u32,
}

impl ComponentSpec {
    /// Installation-relative key of a declared target.
    pub fn target_key(&self, pair: &FilePair) -> String {
        rel_key(&Path::new(&self.target_subdir).join(&pair.target))
    }

    pub fn target_dir(&self, install: &Installation) -> PathBuf {
        install.root.join(&self.target_subdir)
    }
}

/// Collaborators handed to every component of one installation.
#[derive(Clone)]
pub struct ComponentContext {
    pub source_root: PathBuf,
    pub logger: SharedLogger,
    pub validator: Arc<dyn PathValidator>,
    pub settings: Arc<dyn VersionRegistry>,
}

impl ComponentContext {
    /// Context with the stock security validator and the installation's settings registry.
    pub fn new(install: &Installation, source_root: impl Into<PathBuf>, logger: SharedLogger) -> Self {
        Self {
            source_root: source_root.into(),
            logger,
            validator: Arc::new(SecurityValidator),
            settings: Arc::new(SettingsRegistry::new(install)),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn PathValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn VersionRegistry>) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisites {
    pub ok: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentConfig {
    pub overwrite: bool,
}

/// Installation-relative paths touched by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentOutcome {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
    pub removed: Vec<String>,
}

/// Walk up to the nearest existing ancestor and check it can take a new directory.
fn creatable(dir: &Path) -> Result<(), String> {
    let mut cursor = Some(dir);
    while let Some(path) = cursor {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => {
                if meta.permissions().readonly() {
                    return Err(format!("{} is read-only", path.display()));
                }
                return Ok(());
            }
            Ok(_) => return Err(format!("{} exists and is not a directory", path.display())),
            Err(_) => cursor = path.parent(),
        }
    }
    Err(format!("no existing ancestor for {}", dir.display()))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn copy_with_mode(source: &Path, target: &Path, mode: u32) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, target)?;
    set_mode(target, mode)
}

/// Shared implementation of the component lifecycle over a [`ComponentSpec`].
#[derive(Clone)]
pub struct FileComponent {
    spec: ComponentSpec,
    ctx: ComponentContext,
}

impl FileComponent {
    pub fn new(spec: ComponentSpec, ctx: ComponentContext) -> Self {
        Self { spec, ctx }
    }

    pub fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    pub fn context(&self) -> &ComponentContext {
        &self.ctx
    }

    pub fn source_dir(&self) -> PathBuf {
        self.ctx.source_root.join(&self.spec.source_subdir)
    }

    fn store(&self, install: &Installation) -> MetadataStore {
        MetadataStore::new(install.clone(), self.ctx.logger.clone())
    }

    fn failed(&self, errors: Vec<String>) -> CrewError {
        CrewError::ComponentFailed {
            component: self.spec.name.clone(),
            errors,
        }
    }

    /// Checks that must pass before any file is touched.
    pub fn validate_prerequisites(&self, install: &Installation) -> Prerequisites {
        let mut reasons = Vec::new();

        for dep in &self.spec.dependencies {
            if !dep.markers.iter().any(|m| install.resolve(m).exists()) {
                reasons.push(format!(
                    "dependency '{}' is not installed (expected one of: {})",
                    dep.name,
                    dep.markers.join(", ")
                ));
            }
        }

        let source = self.source_dir();
        let target = self.spec.target_dir(install);
        if !source.is_dir() {
            reasons.push(format!("source directory {} not found", source.display()));
        } else {
            for pair in &self.spec.files {
                if check_relative_path(&pair.source).is_none() && !source.join(&pair.source).is_file() {
                    reasons.push(format!("source file {} not found", pair.source));
                }
            }
        }
        if let Err(reason) = creatable(&target) {
            reasons.push(format!("target directory not creatable: {}", reason));
        }
        if let Err(errors) = self.ctx.validator.validate_files(&self.spec.files, &source, &target) {
            reasons.extend(errors);
        }

        Prerequisites {
            ok: reasons.is_empty(),
            reasons,
        }
    }

    pub fn install(
        &self,
        install: &Installation,
        config: &ComponentConfig,
    ) -> Result<ComponentOutcome, CrewError> {
        let name = self.spec.name.as_str();
        let logger = &self.ctx.logger;
        let prereqs = self.validate_prerequisites(install);
        if !prereqs.ok {
            return Err(self.failed(prereqs.reasons));
        }

        let source = self.source_dir();
        let target = self.spec.target_dir(install);
        let created_dir = !target.exists();
        fs::create_dir_all(&target)?;

        let mut outcome = ComponentOutcome::default();
        let mut errors = Vec::new();
        for pair in &self.spec.files {
            let key = self.spec.target_key(pair);
            let dest = target.join(&pair.target);
            if dest.exists() && !config.overwrite {
                logger.info(&format!("{}: keeping existing {}", name, key));
                outcome.skipped.push(key);
                continue;
            }
            match copy_with_mode(&source.join(&pair.source), &dest, self.spec.file_mode) {
                Ok(()) => {
                    logger.debug(&format!("{}: wrote {}", name, key));
                    outcome.written.push(key);
                }
                Err(e) => {
                    logger.warn(&format!("{}: failed to copy {}: {}", name, key, e));
                    errors.push(format!("{}: {}", key, e));
                }
            }
        }

        let complete = errors.is_empty();
        let digest = if complete {
            Some(checksum::digest_dir(&target)?)
        } else {
            None
        };
        let target_key = rel_key(Path::new(&self.spec.target_subdir));
        self.store(install).update(|m| {
            if created_dir {
                m.add_to_inventory(&target_key, InventoryKind::Directory);
            }
            for key in &outcome.written {
                m.add_to_inventory(key, InventoryKind::File);
                m.track_file(&install.root, key, name)?;
            }
            if let Some(digest) = digest {
                m.record_component(name, &self.spec.version, Some(digest));
            }
            Ok(())
        })?;

        if !complete {
            return Err(self.failed(errors));
        }
        if let Err(e) = self
            .ctx
            .settings
            .update_component_version(name, &self.spec.version)
        {
            logger.warn(&format!("{}: settings registry not updated: {}", name, e));
        }
        logger.info(&format!(
            "installed {} {} ({} written, {} kept)",
            name,
            self.spec.version,
            outcome.written.len(),
            outcome.skipped.len()
        ));
        Ok(outcome)
    }

    /// Copy current targets aside, then reinstall with overwrite.
    pub fn update(
        &self,
        install: &Installation,
        config: &ComponentConfig,
    ) -> Result<ComponentOutcome, CrewError> {
        let name = self.spec.name.as_str();
        let logger = &self.ctx.logger;
        let prereqs = self.validate_prerequisites(install);
        if !prereqs.ok {
            return Err(self.failed(prereqs.reasons));
        }

        let old_version = self
            .store(install)
            .component_version(name)?
            .unwrap_or_else(|| "unknown".to_string());
        let target = self.spec.target_dir(install);
        let existing: Vec<&FilePair> = self
            .spec
            .files
            .iter()
            .filter(|p| target.join(&p.target).is_file())
            .collect();

        if !existing.is_empty() {
            let stash = install.backups_dir().join("components").join(format!(
                "{}_{}_{}",
                name,
                old_version,
                time::file_stamp(&time::now())
            ));
            match fs::create_dir_all(&stash) {
                Ok(()) => {
                    for pair in existing {
                        let dest = stash.join(&pair.target);
                        let copied = dest
                            .parent()
                            .map(fs::create_dir_all)
                            .unwrap_or(Ok(()))
                            .and_then(|_| fs::copy(target.join(&pair.target), &dest));
                        if let Err(e) = copied {
                            logger.warn(&format!(
                                "{}: could not back up {}: {}",
                                name, pair.target, e
                            ));
                        }
                    }
                    logger.info(&format!(
                        "{}: previous files saved to {}",
                        name,
                        stash.display()
                    ));
                }
                Err(e) => logger.warn(&format!(
                    "{}: could not create {}: {}",
                    name,
                    stash.display(),
                    e
                )),
            }
        }

        let config = ComponentConfig {
            overwrite: true,
            ..config.clone()
        };
        self.install(install, &config)
    }

    /// Remove exactly the declared targets; anything else in the directory survives.
    pub fn uninstall(
        &self,
        install: &Installation,
        _config: &ComponentConfig,
    ) -> Result<ComponentOutcome, CrewError> {
        let name = self.spec.name.as_str();
        let logger = &self.ctx.logger;
        let target = self.spec.target_dir(install);
        let mut outcome = ComponentOutcome::default();
        let mut errors = Vec::new();

        for pair in &self.spec.files {
            if let Some(reason) = check_relative_path(&pair.target) {
                logger.warn(&format!("{}: not removing {}", name, reason));
                continue;
            }
            let key = self.spec.target_key(pair);
            let path = target.join(&pair.target);
            match fs::symlink_metadata(&path) {
                Err(_) => continue,
                Ok(meta) if meta.is_dir() => {
                    logger.warn(&format!("{}: {} is a directory, leaving it", name, key));
                }
                Ok(_) => match fs::remove_file(&path) {
                    Ok(()) => outcome.removed.push(key),
                    Err(e) => {
                        logger.warn(&format!("{}: failed to remove {}: {}", name, key, e));
                        errors.push(format!("{}: {}", key, e));
                    }
                },
            }
        }

        let target_key = rel_key(Path::new(&self.spec.target_subdir));
        let complete = errors.is_empty();
        self.store(install).update(|m| {
            for pair in &self.spec.files {
                let key = self.spec.target_key(pair);
                m.remove_from_inventory(&key);
                m.untrack_file(&key);
            }
            let empty = fs::read_dir(&target)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if empty && m.is_tool_owned(&target_key) {
                match fs::remove_dir(&target) {
                    Ok(()) => {
                        m.remove_from_inventory(&target_key);
                    }
                    Err(e) => logger.warn(&format!(
                        "{}: could not remove {}: {}",
                        name,
                        target.display(),
                        e
                    )),
                }
            }
            if complete {
                m.remove_component(name);
            }
            Ok(())
        })?;

        if !complete {
            return Err(self.failed(errors));
        }
        if let Err(e) = self.ctx.settings.remove_component_registration(name) {
            logger.warn(&format!("{}: settings registry not updated: {}", name, e));
        }
        logger.info(&format!(
            "uninstalled {} ({} files removed)",
            name,
            outcome.removed.len()
        ));
        Ok(outcome)
    }

    /// Recorded version plus at least one marker on disk.
    pub fn is_installed(&self, install: &Installation) -> bool {
        let recorded = match self.installed_version(install) {
            Ok(version) => version.is_some(),
            Err(e) => {
                self.ctx.logger.warn(&format!(
                    "{}: cannot read metadata: {}",
                    self.spec.name, e
                ));
                false
            }
        };
        recorded && self.spec.markers.iter().any(|m| install.resolve(m).exists())
    }

    pub fn installed_version(&self, install: &Installation) -> Result<Option<String>, CrewError> {
        self.store(install).component_version(&self.spec.name)
    }
}

/// The lifecycle contract the installer drives.
///
/// Implementors only supply [`Component::base`]; every operation defaults to
/// the shared file-copy behaviour.
pub trait Component: Send + Sync {
    fn base(&self) -> &FileComponent;

    fn spec(&self) -> &ComponentSpec {
        self.base().spec()
    }

    fn name(&self) -> &str {
        &self.spec().name
    }

    fn version(&self) -> &str {
        &self.spec().version
    }

    fn validate_prerequisites(&self, install: &Installation) -> Prerequisites {
        self.base().validate_prerequisites(install)
    }

    fn install(
        &self,
        install: &Installation,
        config: &ComponentConfig,
    ) -> Result<ComponentOutcome, CrewError> {
        self.base().install(install, config)
    }

    fn update(
        &self,
        install: &Installation,
        config: &ComponentConfig,
    ) -> Result<ComponentOutcome, CrewError> {
        self.base().update(install, config)
    }

    fn uninstall(
        &self,
        install: &Installation,
        config: &ComponentConfig,
    ) -> Result<ComponentOutcome, CrewError> {
        self.base().uninstall(install, config)
    }

    fn is_installed(&self, install: &Installation) -> bool {
        self.base().is_installed(install)
    }

    fn installed_version(&self, install: &Installation) -> Result<Option<String>, CrewError> {
        self.base().installed_version(install)
    }
}

impl Component for FileComponent {
    fn base(&self) -> &FileComponent {
        self
    }
}
