use crew::core::component::{Component, ComponentConfig, ComponentContext};
use crew::core::logging::MemoryLogger;
use crew::core::store::{InstallScope, Installation};
use crew::plugins::hooks::{self, HooksComponent};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn fixture(root: &Path) -> (Installation, HooksComponent) {
    let source = root.join("templates");
    fs::create_dir_all(source.join("hooks")).unwrap();
    fs::write(source.join("hooks/notify.sh"), "#!/bin/sh\necho done\n").unwrap();
    let install = Installation::new(InstallScope::Project, root.join(".claude"));
    let ctx = ComponentContext::new(&install, &source, MemoryLogger::shared());
    (install.clone(), HooksComponent::with_hooks(ctx, &["notify.sh"]))
}

#[test]
fn hooks_are_installed_executable() {
    let tmp = tempdir().unwrap();
    let (install, component) = fixture(tmp.path());
    component
        .install(&install, &ComponentConfig::default())
        .expect("install");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(install.root.join("hooks/notify.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
    assert!(hooks::validate_installation(component.spec(), &install).is_ok());
}

#[cfg(unix)]
#[test]
fn check_reports_lost_execute_bit() {
    use std::os::unix::fs::PermissionsExt;
    let tmp = tempdir().unwrap();
    let (install, component) = fixture(tmp.path());
    component
        .install(&install, &ComponentConfig::default())
        .unwrap();
    fs::set_permissions(
        install.root.join("hooks/notify.sh"),
        fs::Permissions::from_mode(0o644),
    )
    .unwrap();

    let problems = hooks::validate_installation(component.spec(), &install).unwrap_err();
    assert_eq!(problems, vec!["hooks/notify.sh: not executable".to_string()]);
}

#[test]
fn symlinked_source_is_refused() {
    let tmp = tempdir().unwrap();
    let (install, _component) = fixture(tmp.path());
    let source = tmp.path().join("templates");
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(
            source.join("hooks/notify.sh"),
            source.join("hooks/linked.sh"),
        )
        .unwrap();
        let ctx = ComponentContext::new(&install, &source, MemoryLogger::shared());
        let component = HooksComponent::with_hooks(ctx, &["linked.sh"]);
        let prereqs = component.validate_prerequisites(&install);
        assert!(!prereqs.ok);
        assert!(prereqs.reasons.iter().any(|r| r.contains("symlink")));
        assert!(component.install(&install, &ComponentConfig::default()).is_err());
        assert!(!install.root.join("hooks/linked.sh").exists());
    }
}
