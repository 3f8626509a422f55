use crew::core::backup::CompressionMode;
use crew::core::checksum::{self, FileState, short_hash};
use crew::core::config::load_config;
use crew::core::error::CrewError;
use crew::core::integrity::OverallStatus;
use crew::core::logging::MemoryLogger;
use crew::core::metadata::{ComponentStatus, DocumentStatus, InventoryKind, MetadataStore};
use crew::core::store::{InstallScope, Installation};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn store_at(root: &Path) -> MetadataStore {
    MetadataStore::new(
        Installation::new(InstallScope::Global, root),
        MemoryLogger::shared(),
    )
}

#[test]
fn refresh_never_touches_document_versions() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(root, "CLAUDE.md", "# memory\n");
    write(root, "agents/reviewer.md", "---\nname: reviewer\n---\n");
    write(root, "hooks/README.md", "hooks\n");
    let store = store_at(root);

    let first = store.refresh().expect("first refresh");
    assert_eq!(first.documents["agents/reviewer.md"].version, "1.0.0");
    assert_eq!(first.documents["agents/reviewer.md"].component, "agents");
    assert!(store.set_document_version("CLAUDE.md", "1.1.0").unwrap());
    assert!(!store.set_document_version("NOPE.md", "9.9.9").unwrap());

    let before = store.load().unwrap().documents;
    for _ in 0..3 {
        store.refresh().unwrap();
    }
    let after = store.load().unwrap().documents;
    assert_eq!(before.len(), after.len());
    for (path, doc) in &before {
        assert_eq!(doc.version, after[path].version, "{} version drifted", path);
        assert_eq!(
            doc.previous_version, after[path].previous_version,
            "{} previous_version drifted",
            path
        );
    }
    assert_eq!(after["CLAUDE.md"].version, "1.1.0");
    assert_eq!(after["CLAUDE.md"].previous_version, "1.0.0");
}

#[test]
fn refresh_classifies_components_and_documents() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(root, "CLAUDE.md", "v1\n");
    write(root, "agents/a.md", "aaaa");
    write(root, "agents/b.md", "bb");
    let store = store_at(root);

    let m = store.refresh().unwrap();
    assert_eq!(m.components["agents"].status, ComponentStatus::Installed);
    assert_eq!(m.components["agents"].file_count, 2);
    assert_eq!(m.components["agents"].size, 6);
    assert_eq!(m.components["commands"].status, ComponentStatus::Missing);
    assert_eq!(m.components["commands"].size, 0);
    assert_eq!(m.installation.total_files, 2);
    assert_eq!(m.documents["CLAUDE.md"].status, DocumentStatus::Present);
    assert_eq!(m.documents["README.md"].status, DocumentStatus::Missing);

    write(root, "CLAUDE.md", "v2\n");
    let m = store.refresh().unwrap();
    assert_eq!(m.documents["CLAUDE.md"].status, DocumentStatus::Modified);
    let m = store.refresh().unwrap();
    assert_eq!(m.documents["CLAUDE.md"].status, DocumentStatus::Present);

    fs::remove_file(root.join("agents/b.md")).unwrap();
    let m = store.refresh().unwrap();
    assert_eq!(m.documents["agents/b.md"].status, DocumentStatus::Missing);
    assert_eq!(m.documents["agents/b.md"].version, "1.0.0");
}

#[test]
fn corrupted_bytes_are_reported_as_modified_with_one_log_line() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(root, "agents/reviewer.md", "---\nname: reviewer\n---\n");
    write(root, "agents/planner.md", "---\nname: planner\n---\n");
    let store = store_at(root);
    store
        .add_file_to_integrity_tracking("agents/reviewer.md", "agents")
        .unwrap();
    store
        .add_file_to_integrity_tracking("agents/planner.md", "agents")
        .unwrap();
    let original = checksum::hash_file(&root.join("agents/reviewer.md")).unwrap();

    let clean = store.check_file_integrity().unwrap();
    assert_eq!(clean.status, OverallStatus::Clean);
    assert_eq!(clean.clean, 2);

    write(root, "agents/reviewer.md", "---\nname: reviewer\n---\nsneaky edit\n");
    let current = checksum::hash_file(&root.join("agents/reviewer.md")).unwrap();
    let before = store.load().unwrap().integrity.files["agents/reviewer.md"]
        .modifications
        .len();

    let report = store.check_file_integrity().unwrap();
    assert_eq!(report.status, OverallStatus::Warning);
    assert_eq!(report.modified, 1);
    assert_eq!(report.clean, 1);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].path, "agents/reviewer.md");
    assert_eq!(report.findings[0].state, FileState::Modified);

    let m = store.load().unwrap();
    let record = &m.integrity.files["agents/reviewer.md"];
    assert_eq!(record.status, FileState::Modified);
    assert_eq!(record.original_hash, original);
    assert_eq!(record.current_hash, current);
    assert_eq!(record.modifications.len(), before + 1);
    let line = record.modifications.last().unwrap();
    assert!(line.contains(short_hash(&original)));
    assert!(line.contains(short_hash(&current)));
    assert_eq!(m.integrity.status, OverallStatus::Warning);
}

#[test]
fn unreadable_file_is_critical_even_alongside_missing_ones() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(root, "hooks/a.sh", "#!/bin/sh\n");
    write(root, "hooks/b.sh", "#!/bin/sh\n");
    let store = store_at(root);
    store.add_file_to_integrity_tracking("hooks/a.sh", "hooks").unwrap();
    store.add_file_to_integrity_tracking("hooks/b.sh", "hooks").unwrap();

    fs::remove_file(root.join("hooks/a.sh")).unwrap();
    fs::remove_file(root.join("hooks/b.sh")).unwrap();
    fs::create_dir(root.join("hooks/b.sh")).unwrap();

    let report = store.check_file_integrity().unwrap();
    assert_eq!(report.missing, 1);
    assert_eq!(report.corrupted, 1);
    assert_eq!(report.status, OverallStatus::Critical);

    assert!(store.remove_from_integrity_tracking("hooks/b.sh").unwrap());
    assert!(!store.remove_from_integrity_tracking("hooks/b.sh").unwrap());
    let report = store.check_file_integrity().unwrap();
    assert_eq!(report.total_files, 1);
    assert_eq!(report.status, OverallStatus::Warning);
}

#[test]
fn corrupt_metadata_is_fatal_and_inventory_persists() {
    let tmp = tempdir().unwrap();
    let store = store_at(tmp.path());
    assert!(store.add_to_inventory("agents", InventoryKind::Directory).unwrap());
    assert!(store.add_to_inventory("agents/a.md", InventoryKind::File).unwrap());
    assert!(!store.add_to_inventory("agents/a.md", InventoryKind::File).unwrap());
    assert!(store.load().unwrap().is_tool_owned("agents/a.md"));
    assert!(store.remove_from_inventory("agents/a.md").unwrap());

    fs::write(store.path(), "{\"framework\": ").unwrap();
    assert!(matches!(store.load(), Err(CrewError::JsonError(_))));
    assert!(store.refresh().is_err());
}

#[test]
fn config_file_overrides_defaults() {
    let tmp = tempdir().unwrap();
    let install = Installation::new(InstallScope::Project, tmp.path());
    let defaults = load_config(&install).unwrap();
    assert_eq!(defaults.backup.keep_count, 10);
    assert_eq!(defaults.backup.compression, CompressionMode::Gzip);

    fs::create_dir_all(install.config_dir()).unwrap();
    fs::write(
        install.config_path(),
        "[backup]\nkeep_count = 3\ncompression = \"none\"\n\n[install]\noverwrite = true\n",
    )
    .unwrap();
    let config = load_config(&install).unwrap();
    assert_eq!(config.backup.keep_count, 3);
    assert_eq!(config.backup.compression, CompressionMode::None);
    assert_eq!(config.backup.max_age_days, 30);
    assert!(config.install.overwrite);

    fs::write(install.config_path(), "[backup\n").unwrap();
    assert!(matches!(
        load_config(&install),
        Err(CrewError::TomlDecodeError(_))
    ));
}
