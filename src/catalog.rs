//! Component registration.
//!
//! Adding a new component: append one entry to `COMPONENTS`.

use crate::core::component::{Component, ComponentContext};
use crate::core::installer::{ComponentRegistry, InstallationCheck};
use crate::plugins::{agents, commands, hooks};

pub struct ComponentInit {
    pub name: &'static str,
    pub build: fn(&ComponentContext) -> Box<dyn Component>,
    pub validate_installation: Option<InstallationCheck>,
}

/// Every shipped component, in dependency order.
pub const COMPONENTS: &[ComponentInit] = &[
    ComponentInit { name: agents::NAME, build: agents::build, validate_installation: Some(agents::validate_installation) },
    ComponentInit { name: commands::NAME, build: commands::build, validate_installation: Some(commands::validate_installation) },
    ComponentInit { name: hooks::NAME, build: hooks::build, validate_installation: Some(hooks::validate_installation) },
];

pub fn component_names() -> Vec<String> {
    COMPONENTS.iter().map(|c| c.name.to_string()).collect()
}

/// Build a registry holding every shipped component.
pub fn default_registry(ctx: &ComponentContext) -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    for init in COMPONENTS {
        registry.register((init.build)(ctx), init.validate_installation);
    }
    registry
}
