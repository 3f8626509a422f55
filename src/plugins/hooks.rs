//! Executable hook scripts installed into `hooks/`.

use crate::core::component::{Component, ComponentContext, ComponentSpec, FileComponent};
use crate::core::security::FilePair;
use crate::core::store::Installation;
use std::fs;
use std::path::Path;

pub const NAME: &str = "hooks";
pub const VERSION: &str = "1.0.1";
pub const TARGET_DIR: &str = "hooks";

pub const STANDARD_HOOKS: &[&str] = &["post-tool-use.sh", "pre-tool-use.sh", "session-start.sh"];

pub fn spec<S: AsRef<str>>(hooks: &[S]) -> ComponentSpec {
    let files: Vec<FilePair> = hooks.iter().map(|h| FilePair::same(h.as_ref())).collect();
    ComponentSpec {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Lifecycle hook scripts".to_string(),
        category: "automation".to_string(),
        dependencies: Vec::new(),
        source_subdir: TARGET_DIR.to_string(),
        target_subdir: TARGET_DIR.to_string(),
        markers: files
            .iter()
            .map(|p| format!("{}/{}", TARGET_DIR, p.target))
            .collect(),
        files,
        file_mode: 0o755,
    }
}

pub struct HooksComponent {
    base: FileComponent,
}

impl HooksComponent {
    pub fn new(ctx: ComponentContext) -> Self {
        Self::with_hooks(ctx, STANDARD_HOOKS)
    }

    pub fn with_hooks<S: AsRef<str>>(ctx: ComponentContext, hooks: &[S]) -> Self {
        Self {
            base: FileComponent::new(spec(hooks), ctx),
        }
    }
}

impl Component for HooksComponent {
    fn base(&self) -> &FileComponent {
        &self.base
    }
}

pub fn build(ctx: &ComponentContext) -> Box<dyn Component> {
    Box::new(HooksComponent::new(ctx.clone()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Every declared script exists, is executable and starts with a shebang.
pub fn validate_installation(spec: &ComponentSpec, install: &Installation) -> Result<(), Vec<String>> {
    let dir = spec.target_dir(install);
    let mut problems = Vec::new();
    for pair in &spec.files {
        let key = spec.target_key(pair);
        let path = dir.join(&pair.target);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                problems.push(format!("{}: {}", key, e));
                continue;
            }
        };
        if !content.starts_with("#!") {
            problems.push(format!("{}: no shebang", key));
        }
        if !is_executable(&path) {
            problems.push(format!("{}: not executable", key));
        }
    }
    if problems.is_empty() { Ok(()) } else { Err(problems) }
}
