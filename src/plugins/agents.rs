//! Agent definitions installed into `agents/`.
//!
//! Every agent is a markdown file opening with a front-matter block:
//!
//! ```text
//! ---
//! name: code-reviewer
//! description: Reviews diffs for correctness
//! ---
//! ```

use crate::core::component::{Component, ComponentContext, ComponentSpec, FileComponent};
use crate::core::security::FilePair;
use crate::core::store::Installation;
use std::fs;

pub const NAME: &str = "agents";
pub const VERSION: &str = "1.2.0";
pub const TARGET_DIR: &str = "agents";

pub const STANDARD_AGENTS: &[&str] = &[
    "architect.md",
    "code-reviewer.md",
    "debugger.md",
    "docs-writer.md",
    "test-runner.md",
];

/// Installation-relative marker paths of the standard agents.
pub fn standard_markers() -> Vec<String> {
    STANDARD_AGENTS
        .iter()
        .map(|f| format!("{}/{}", TARGET_DIR, f))
        .collect()
}

pub fn spec<S: AsRef<str>>(agents: &[S]) -> ComponentSpec {
    let files: Vec<FilePair> = agents.iter().map(|a| FilePair::same(a.as_ref())).collect();
    ComponentSpec {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Agent definitions".to_string(),
        category: "core".to_string(),
        dependencies: Vec::new(),
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

pub struct AgentsComponent {
    base: FileComponent,
}

impl AgentsComponent {
    pub fn new(ctx: ComponentContext) -> Self {
        Self::with_agents(ctx, STANDARD_AGENTS)
    }

    pub fn with_agents<S: AsRef<str>>(ctx: ComponentContext, agents: &[S]) -> Self {
        Self {
            base: FileComponent::new(spec(agents), ctx),
        }
    }

    /// Declared agent files currently present in the installation.
    pub fn agent_count(&self, install: &Installation) -> usize {
        let dir = self.base.spec().target_dir(install);
        self.base
            .spec()
            .files
            .iter()
            .filter(|p| dir.join(&p.target).is_file())
            .count()
    }
}

impl Component for AgentsComponent {
    fn base(&self) -> &FileComponent {
        &self.base
    }
}

pub fn build(ctx: &ComponentContext) -> Box<dyn Component> {
    Box::new(AgentsComponent::new(ctx.clone()))
}

/// True when `content` opens with a closed `---` block containing a `name:` key.
pub fn has_front_matter(content: &str) -> bool {
    let mut lines = content.lines();
    if lines.next().map(str::trim_end) != Some("---") {
        return false;
    }
    let mut named = false;
    for line in lines {
        let line = line.trim_end();
        if line == "---" {
            return named;
        }
        if line.trim_start().starts_with("name:") {
            named = true;
        }
    }
    false
}

pub fn validate_installation(spec: &ComponentSpec, install: &Installation) -> Result<(), Vec<String>> {
    let dir = spec.target_dir(install);
    let mut problems = Vec::new();
    for pair in &spec.files {
        let path = dir.join(&pair.target);
        match fs::read_to_string(&path) {
            Ok(content) if has_front_matter(&content) => {}
            Ok(_) => problems.push(format!("{}: missing front matter", spec.target_key(pair))),
            Err(e) => problems.push(format!("{}: {}", spec.target_key(pair), e)),
        }
    }
    if problems.is_empty() { Ok(()) } else { Err(problems) }
}
