use crew::core::component::{Component, ComponentConfig, ComponentContext};
use crew::core::logging::MemoryLogger;
use crew::core::metadata::{ComponentStatus, MetadataStore};
use crew::core::store::{InstallScope, Installation};
use crew::plugins::agents::{self, AgentsComponent};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const AGENTS: [&str; 3] = ["planner.md", "reviewer.md", "tester.md"];

fn fixture(root: &Path) -> (Installation, AgentsComponent) {
    let source = root.join("templates");
    fs::create_dir_all(source.join("agents")).unwrap();
    for agent in AGENTS {
        let name = agent.trim_end_matches(".md");
        fs::write(
            source.join("agents").join(agent),
            format!("---\nname: {}\ndescription: {} agent\n---\n\nDo the {} work.\n", name, name, name),
        )
        .unwrap();
    }
    let install = Installation::new(InstallScope::Global, root.join(".claude"));
    let ctx = ComponentContext::new(&install, &source, MemoryLogger::shared());
    (install.clone(), AgentsComponent::with_agents(ctx, &AGENTS))
}

#[test]
fn installing_three_agents_into_empty_directory() {
    let tmp = tempdir().unwrap();
    let (install, component) = fixture(tmp.path());
    assert!(!component.is_installed(&install));
    assert_eq!(component.agent_count(&install), 0);

    let outcome = component
        .install(&install, &ComponentConfig::default())
        .expect("install");
    assert_eq!(outcome.written.len(), 3);

    assert!(component.is_installed(&install));
    assert_eq!(component.agent_count(&install), 3);
    assert_eq!(
        component.installed_version(&install).unwrap().as_deref(),
        Some(agents::VERSION)
    );

    let metadata = MetadataStore::new(install.clone(), MemoryLogger::shared())
        .load()
        .unwrap();
    let record = &metadata.components["agents"];
    assert_eq!(record.status, ComponentStatus::Installed);
    assert_eq!(record.file_count, 3);
    assert_eq!(metadata.integrity.total_files, 3);
    assert!(metadata.is_tool_owned("agents"));
    assert!(metadata.is_tool_owned("agents/reviewer.md"));

    assert!(agents::validate_installation(component.spec(), &install).is_ok());
}

#[test]
fn uninstall_twice_is_quietly_successful() {
    let tmp = tempdir().unwrap();
    let (install, component) = fixture(tmp.path());
    component
        .install(&install, &ComponentConfig::default())
        .unwrap();

    let first = component
        .uninstall(&install, &ComponentConfig::default())
        .unwrap();
    assert_eq!(first.removed.len(), 3);
    assert!(!install.root.join("agents").exists());

    let second = component
        .uninstall(&install, &ComponentConfig::default())
        .unwrap();
    assert!(second.removed.is_empty());
    assert_eq!(component.agent_count(&install), 0);
}

#[test]
fn marker_loss_means_not_installed() {
    let tmp = tempdir().unwrap();
    let (install, component) = fixture(tmp.path());
    component
        .install(&install, &ComponentConfig::default())
        .unwrap();
    for agent in AGENTS {
        fs::remove_file(install.root.join("agents").join(agent)).unwrap();
    }
    assert!(component.installed_version(&install).unwrap().is_some());
    assert!(!component.is_installed(&install));
}

#[test]
fn installation_check_flags_missing_front_matter() {
    let tmp = tempdir().unwrap();
    let (install, component) = fixture(tmp.path());
    component
        .install(&install, &ComponentConfig::default())
        .unwrap();
    fs::write(install.root.join("agents/tester.md"), "just text\n").unwrap();

    let problems = agents::validate_installation(component.spec(), &install).unwrap_err();
    assert_eq!(problems, vec!["agents/tester.md: missing front matter".to_string()]);
}
