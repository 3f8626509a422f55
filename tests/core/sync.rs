use crew::core::error::CrewError;
use crew::core::logging::{MemoryLogger, SharedLogger};
use crew::core::metadata::MetadataStore;
use crew::core::store::{InstallScope, Installation};
use crew::core::sync::{SyncOptions, sync_project};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup(tmp: &Path) -> (Installation, Installation, SharedLogger) {
    let global = Installation::new(InstallScope::Global, tmp.join("home/.claude"));
    write(&global.root, "agents/reviewer.md", "---\nname: reviewer\n---\n");
    write(&global.root, "commands/review.md", "Use the reviewer.\n");
    write(&global.root, "hooks/pre.sh", "#!/bin/sh\n");
    write(&global.root, "agents/notes.txt", "not markdown\n");
    let project = Installation::project(&tmp.join("work/app"));
    let logger: SharedLogger = MemoryLogger::shared();
    (global, project, logger)
}

#[test]
fn copies_only_project_scoped_markdown() {
    let tmp = tempdir().unwrap();
    let (global, project, logger) = setup(tmp.path());

    let report = sync_project(&global, &project, &SyncOptions::default(), &logger).unwrap();
    assert_eq!(report.copied, vec!["agents/reviewer.md", "commands/review.md"]);
    assert!(project.root.join("agents/reviewer.md").is_file());
    assert!(!project.root.join("hooks").exists());
    assert!(!project.root.join("agents/notes.txt").exists());

    let metadata = MetadataStore::new(project.clone(), logger.clone()).load().unwrap();
    assert!(metadata.is_tool_owned("agents/reviewer.md"));
    assert!(metadata.is_tool_owned("commands"));
    assert_eq!(metadata.integrity.files["commands/review.md"].component, "commands");

    let again = sync_project(&global, &project, &SyncOptions::default(), &logger).unwrap();
    assert!(again.copied.is_empty());
    assert_eq!(again.unchanged.len(), 2);
}

#[test]
fn differing_project_files_are_kept_unless_overwrite() {
    let tmp = tempdir().unwrap();
    let (global, project, logger) = setup(tmp.path());
    write(&project.root, "agents/reviewer.md", "---\nname: reviewer\n---\nproject tweak\n");

    let report = sync_project(&global, &project, &SyncOptions::default(), &logger).unwrap();
    assert_eq!(report.skipped, vec!["agents/reviewer.md"]);
    assert!(
        fs::read_to_string(project.root.join("agents/reviewer.md"))
            .unwrap()
            .contains("project tweak")
    );

    let opts = SyncOptions {
        overwrite: true,
        dry_run: false,
    };
    let report = sync_project(&global, &project, &opts, &logger).unwrap();
    assert!(report.copied.contains(&"agents/reviewer.md".to_string()));
    assert_eq!(
        fs::read(project.root.join("agents/reviewer.md")).unwrap(),
        fs::read(global.root.join("agents/reviewer.md")).unwrap()
    );
}

#[test]
fn dry_run_writes_nothing() {
    let tmp = tempdir().unwrap();
    let (global, project, logger) = setup(tmp.path());
    let opts = SyncOptions {
        overwrite: false,
        dry_run: true,
    };
    let report = sync_project(&global, &project, &opts, &logger).unwrap();
    assert_eq!(report.planned.len(), 2);
    assert!(!project.root.exists());
}

#[test]
fn missing_global_installation_is_an_error() {
    let tmp = tempdir().unwrap();
    let global = Installation::new(InstallScope::Global, tmp.path().join("nowhere"));
    let project = Installation::project(tmp.path());
    let logger: SharedLogger = MemoryLogger::shared();
    assert!(matches!(
        sync_project(&global, &project, &SyncOptions::default(), &logger),
        Err(CrewError::NotFound(_))
    ));
}

#[cfg(unix)]
#[test]
fn symlinks_in_the_project_are_never_written_through() {
    let tmp = tempdir().unwrap();
    let (global, project, logger) = setup(tmp.path());
    let victim = tmp.path().join("work/victim.txt");
    write(tmp.path(), "work/victim.txt", "untouched\n");
    fs::create_dir_all(project.root.join("agents")).unwrap();
    std::os::unix::fs::symlink(&victim, project.root.join("agents/reviewer.md")).unwrap();
    let outside = tmp.path().join("elsewhere");
    fs::create_dir_all(&outside).unwrap();
    std::os::unix::fs::symlink(&outside, project.root.join("commands")).unwrap();

    let opts = SyncOptions {
        overwrite: true,
        dry_run: false,
    };
    let report = sync_project(&global, &project, &opts, &logger).unwrap();
    assert!(report.copied.is_empty(), "{:?}", report.copied);
    assert_eq!(report.skipped, vec!["agents/reviewer.md", "commands/review.md"]);
    assert_eq!(fs::read_to_string(&victim).unwrap(), "untouched\n");
    assert!(!outside.join("review.md").exists());
    assert!(
        fs::symlink_metadata(project.root.join("agents/reviewer.md"))
            .unwrap()
            .file_type()
            .is_symlink()
    );
}
