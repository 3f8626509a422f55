//! Slash-command definitions installed into `commands/`.
//!
//! Commands reference agents by name, so the standard agents must be present
//! first.

use crate::core::component::{Component, ComponentContext, ComponentSpec, Dependency, FileComponent};
use crate::core::security::FilePair;
use crate::core::store::Installation;
use crate::plugins::agents;
use std::fs;

pub const NAME: &str = "commands";
pub const VERSION: &str = "1.1.0";
pub const TARGET_DIR: &str = "commands";

pub const STANDARD_COMMANDS: &[&str] = &["plan.md", "review.md", "test.md"];

pub fn spec<S: AsRef<str>>(commands: &[S]) -> ComponentSpec {
    let files: Vec<FilePair> = commands
        .iter()
        .map(|c| FilePair::same(c.as_ref()))
        .collect();
    let agent_markers = agents::standard_markers();
    ComponentSpec {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Slash commands".to_string(),
        category: "core".to_string(),
        dependencies: vec![Dependency {
            name: agents::NAME.to_string(),
            markers: agent_markers,
        }],
        source_subdir: TARGET_DIR.to_string(),
        target_subdir: TARGET_DIR.to_string(),
        markers: files
            .iter()
            .map(|p| format!("{}/{}", TARGET_DIR, p.target))
            .collect(),
        files,
        file_mode: 0o644,
    }
}

pub struct CommandsComponent {
    base: FileComponent,
}

impl CommandsComponent {
    pub fn new(ctx: ComponentContext) -> Self {
        Self::with_commands(ctx, STANDARD_COMMANDS)
    }

    pub fn with_commands<S: AsRef<str>>(ctx: ComponentContext, commands: &[S]) -> Self {
        Self {
            base: FileComponent::new(spec(commands), ctx),
        }
    }
}

impl Component for CommandsComponent {
    fn base(&self) -> &FileComponent {
        &self.base
    }
}

pub fn build(ctx: &ComponentContext) -> Box<dyn Component> {
    Box::new(CommandsComponent::new(ctx.clone()))
}

/// Every declared command file exists and is not blank.
pub fn validate_installation(spec: &ComponentSpec, install: &Installation) -> Result<(), Vec<String>> {
    let dir = spec.target_dir(install);
    let problems: Vec<String> = spec
        .files
        .iter()
        .filter_map(|pair| match fs::read_to_string(dir.join(&pair.target)) {
            Ok(content) if !content.trim().is_empty() => None,
            Ok(_) => Some(format!("{}: empty", spec.target_key(pair))),
            Err(e) => Some(format!("{}: {}", spec.target_key(pair), e)),
        })
        .collect();
    if problems.is_empty() { Ok(()) } else { Err(problems) }
}
