use crew::core::backup::{
    BackupManager, BackupOptions, CompressionMode, METADATA_MEMBER, RestoreOptions, sidecar_path,
};
use crew::core::checksum;
use crew::core::error::CrewError;
use crew::core::logging::{LogLevel, MemoryLogger};
use crew::core::store::{InstallScope, Installation};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn populated_install(root: &Path) -> Installation {
    write(root, "CLAUDE.md", "# project memory\n");
    write(root, "agents/reviewer.md", "---\nname: reviewer\n---\n");
    write(root, "agents/nested/planner.md", "---\nname: planner\n---\n");
    write(root, "hooks/pre.sh", "#!/bin/sh\nexit 0\n");
    write(root, ".crew/config/settings.toml", "[components]\nagents = \"1.2.0\"\n");
    // excluded by the filter
    write(root, ".git/HEAD", "ref: refs/heads/main\n");
    write(root, ".crew/logs/install.log", "log line\n");
    write(root, "agents/draft.md.tmp", "scratch\n");
    write(root, "agents/old.md.bak", "old\n");
    write(root, "debug.log", "noise\n");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(root.join("hooks/pre.sh"), fs::Permissions::from_mode(0o755)).unwrap();
    }
    Installation::new(InstallScope::Global, root)
}

fn manager(install: &Installation) -> (BackupManager, Arc<MemoryLogger>) {
    let logger = MemoryLogger::shared();
    (BackupManager::new(install.clone(), logger.clone()), logger)
}

#[test]
fn create_then_restore_reproduces_included_files() {
    let tmp = tempdir().unwrap();
    let install = populated_install(&tmp.path().join("home"));
    let (manager, _logger) = manager(&install);

    let archive = manager.create(&BackupOptions::default()).expect("create");
    assert!(archive.starts_with(install.backups_dir()));
    assert!(archive.to_string_lossy().ends_with(".tar.gz"));
    assert!(sidecar_path(&archive).exists());

    let target = tmp.path().join("restored");
    let report = manager
        .restore(
            &archive,
            &RestoreOptions {
                target_dir: Some(target.clone()),
                overwrite: false,
            },
        )
        .expect("restore");
    assert_eq!(report.restored, 5);
    assert!(report.skipped.is_empty());

    for rel in [
        "CLAUDE.md",
        "agents/reviewer.md",
        "agents/nested/planner.md",
        "hooks/pre.sh",
        ".crew/config/settings.toml",
    ] {
        assert_eq!(
            fs::read(install.root.join(rel)).unwrap(),
            fs::read(target.join(rel)).unwrap(),
            "{} differs",
            rel
        );
    }
    for rel in [
        ".git/HEAD",
        ".crew/logs/install.log",
        "agents/draft.md.tmp",
        "agents/old.md.bak",
        "debug.log",
        ".crew/backups",
        METADATA_MEMBER,
    ] {
        assert!(!target.join(rel).exists(), "{} should not be restored", rel);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(target.join("hooks/pre.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[test]
fn metadata_member_comes_first_and_defers_to_sidecar() {
    let tmp = tempdir().unwrap();
    let install = populated_install(tmp.path());
    let (manager, _logger) = manager(&install);
    let archive = manager
        .create(&BackupOptions::default().with_description("before agents upgrade"))
        .unwrap();
    let name = archive.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("crew_backup_"));
    assert!(name.ends_with("_before_agents_upgrade.tar.gz"));

    let mut reader = tar::Archive::new(flate2::read::GzDecoder::new(File::open(&archive).unwrap()));
    let mut entries = reader.entries().unwrap();
    let mut first = entries.next().unwrap().unwrap();
    assert_eq!(first.path().unwrap().to_string_lossy(), METADATA_MEMBER);
    let mut embedded = String::new();
    first.read_to_string(&mut embedded).unwrap();
    let embedded: serde_json::Value = serde_json::from_str(&embedded).unwrap();
    assert_eq!(embedded["size"], 0);
    assert_eq!(embedded["checksum"], "");
    assert_eq!(embedded["description"], "before agents upgrade");

    let info = manager.backup_info(&archive).unwrap();
    assert_eq!(info.metadata.checksum, checksum::hash_file(&archive).unwrap());
    assert_eq!(info.metadata.size, fs::metadata(&archive).unwrap().len());
    assert_eq!(info.file_count, 5);
    assert!(manager.verify(&archive).unwrap());
}

#[test]
fn tampered_archive_fails_before_any_write() {
    let tmp = tempdir().unwrap();
    let install = populated_install(&tmp.path().join("home"));
    let (manager, _logger) = manager(&install);
    let archive = manager.create(&BackupOptions::default()).unwrap();

    let mut bytes = fs::read(&archive).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xff;
    fs::write(&archive, bytes).unwrap();

    let target = tmp.path().join("restored");
    let err = manager
        .restore(
            &archive,
            &RestoreOptions {
                target_dir: Some(target.clone()),
                overwrite: true,
            },
        )
        .unwrap_err();
    assert!(matches!(err, CrewError::ChecksumMismatch { .. }));
    assert!(!target.exists());
    assert!(matches!(
        manager.verify(&archive),
        Err(CrewError::ChecksumMismatch { .. })
    ));
}

fn raw_member<W: std::io::Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) {
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, data).unwrap();
}

#[test]
fn traversal_member_rejects_whole_restore() {
    let tmp = tempdir().unwrap();
    let install = Installation::new(InstallScope::Global, tmp.path().join("home"));
    fs::create_dir_all(&install.root).unwrap();
    let (manager, logger) = manager(&install);

    let archive = tmp.path().join("evil.tar");
    let metadata = serde_json::json!({
        "backup_version": "1.0",
        "created": "2026-01-01T00:00:00Z",
        "timestamp": 1767225600,
        "install_dir": install.root.display().to_string(),
        "components": {},
        "framework_version": "0.9.2",
        "size": 0,
        "checksum": "",
        "backup_type": "manual",
        "description": ""
    });
    {
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        raw_member(&mut builder, METADATA_MEMBER, metadata.to_string().as_bytes());
        raw_member(&mut builder, "ok.txt", b"fine");
        raw_member(&mut builder, "../../escape.txt", b"gotcha");
        builder.finish().unwrap();
    }

    let err = manager
        .restore(&archive, &RestoreOptions::default())
        .unwrap_err();
    assert!(matches!(err, CrewError::PathTraversal(_)));
    assert!(!install.root.join("ok.txt").exists());
    assert!(!tmp.path().join("escape.txt").exists());
    assert!(logger.contains("no checksum recorded"));
}

#[test]
fn restore_skips_existing_files_unless_overwrite() {
    let tmp = tempdir().unwrap();
    let install = populated_install(tmp.path());
    let (manager, _logger) = manager(&install);
    let archive = manager.create(&BackupOptions::default()).unwrap();

    fs::write(install.root.join("CLAUDE.md"), "local edits").unwrap();
    let report = manager.restore(&archive, &RestoreOptions::default()).unwrap();
    assert_eq!(report.restored, 0);
    assert_eq!(report.skipped.len(), 5);
    assert_eq!(fs::read_to_string(install.root.join("CLAUDE.md")).unwrap(), "local edits");

    let report = manager
        .restore(
            &archive,
            &RestoreOptions {
                target_dir: None,
                overwrite: true,
            },
        )
        .unwrap();
    assert_eq!(report.restored, 5);
    assert_eq!(
        fs::read_to_string(install.root.join("CLAUDE.md")).unwrap(),
        "# project memory\n"
    );
}

fn backdate(archive: &Path, hours: i64) {
    let sidecar = sidecar_path(archive);
    let mut meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&sidecar).unwrap()).unwrap();
    let created = chrono::Utc::now() - chrono::Duration::hours(hours);
    meta["created"] = serde_json::to_value(created).unwrap();
    meta["timestamp"] = serde_json::json!(created.timestamp());
    fs::write(&sidecar, serde_json::to_string_pretty(&meta).unwrap()).unwrap();
}

#[test]
fn cleanup_keeps_the_newest_archives() {
    let tmp = tempdir().unwrap();
    let install = populated_install(tmp.path());
    let (manager, _logger) = manager(&install);

    let mut archives = Vec::new();
    for i in 0..4 {
        let archive = manager.create(&BackupOptions::default()).unwrap();
        backdate(&archive, 10 - i);
        archives.push(archive);
    }
    assert_eq!(manager.list_backups().unwrap().len(), 4);

    let removed = manager.cleanup(2, 0).unwrap();
    assert_eq!(removed, 2);

    let remaining: Vec<_> = manager
        .list_backups()
        .unwrap()
        .into_iter()
        .map(|b| b.path)
        .collect();
    assert_eq!(remaining, vec![archives[3].clone(), archives[2].clone()]);
    for old in &archives[..2] {
        assert!(!old.exists());
        assert!(!sidecar_path(old).exists());
    }
}

#[test]
fn cleanup_by_age_and_union_of_rules() {
    let tmp = tempdir().unwrap();
    let install = populated_install(tmp.path());
    let (manager, _logger) = manager(&install);

    let ancient = manager.create(&BackupOptions::default()).unwrap();
    backdate(&ancient, 24 * 45);
    let recent = manager.create(&BackupOptions::default()).unwrap();
    backdate(&recent, 1);
    let newest = manager.create(&BackupOptions::default()).unwrap();

    assert_eq!(manager.cleanup(0, 0).unwrap(), 0);
    assert_eq!(manager.cleanup(0, 30).unwrap(), 1);
    assert!(!ancient.exists());

    assert_eq!(manager.cleanup(1, 30).unwrap(), 1);
    assert!(!recent.exists());
    assert!(newest.exists());
}

#[test]
fn bzip2_archives_are_real_bzip2_and_restore() {
    let tmp = tempdir().unwrap();
    let install = populated_install(&tmp.path().join("home"));
    let (manager, logger) = manager(&install);

    let opts = BackupOptions {
        compression: CompressionMode::Bzip2,
        ..BackupOptions::default()
    };
    let archive = manager.create(&opts).unwrap();
    assert!(archive.to_string_lossy().ends_with(".tar.bz2"));
    assert!(fs::read(&archive).unwrap().starts_with(b"BZh"));
    assert!(logger.messages_at(LogLevel::Warn).is_empty());
    assert_eq!(manager.backup_info(&archive).unwrap().file_count, 5);
    assert!(manager.verify(&archive).unwrap());

    let target = tmp.path().join("restored");
    let report = manager
        .restore(
            &archive,
            &RestoreOptions {
                target_dir: Some(target.clone()),
                overwrite: false,
            },
        )
        .unwrap();
    assert_eq!(report.restored, 5);
    assert_eq!(
        fs::read(install.root.join("agents/nested/planner.md")).unwrap(),
        fs::read(target.join("agents/nested/planner.md")).unwrap()
    );
}

#[test]
fn archives_made_within_one_second_keep_creation_order() {
    let tmp = tempdir().unwrap();
    let install = populated_install(tmp.path());
    let (manager, _logger) = manager(&install);

    let mut last = None;
    for _ in 0..12 {
        last = Some(manager.create(&BackupOptions::default()).unwrap());
    }
    let last = last.unwrap();
    let listed = manager.list_backups().unwrap();
    assert_eq!(listed.len(), 12);
    assert_eq!(listed[0].path, last);
    assert!(
        listed
            .windows(2)
            .all(|w| w[0].metadata.created >= w[1].metadata.created)
    );

    assert_eq!(manager.cleanup(1, 0).unwrap(), 11);
    assert!(last.exists());
    assert_eq!(manager.list_backups().unwrap().len(), 1);
}

#[cfg(unix)]
#[test]
fn symlinked_directory_in_target_fails_restore_before_any_write() {
    let tmp = tempdir().unwrap();
    let home = tmp.path().join("home");
    write(&home, "CLAUDE.md", "# memory\n");
    write(&home, "agents/sub/deep/x.md", "---\nname: x\n---\n");
    let install = Installation::new(InstallScope::Global, &home);
    let (manager, _logger) = manager(&install);
    let archive = manager.create(&BackupOptions::default()).unwrap();

    fs::remove_file(home.join("CLAUDE.md")).unwrap();
    fs::remove_dir_all(home.join("agents")).unwrap();
    let outside = tmp.path().join("outside");
    fs::create_dir_all(&outside).unwrap();
    std::os::unix::fs::symlink("../outside", home.join("agents")).unwrap();

    let err = manager
        .restore(
            &archive,
            &RestoreOptions {
                target_dir: None,
                overwrite: true,
            },
        )
        .unwrap_err();
    assert!(matches!(err, CrewError::PathTraversal(_)), "{:?}", err);
    assert!(!outside.join("sub").exists());
    assert!(!home.join("CLAUDE.md").exists());
}

#[test]
fn missing_sidecar_falls_back_to_embedded_metadata() {
    let tmp = tempdir().unwrap();
    let install = populated_install(&tmp.path().join("home"));
    let (manager, _logger) = manager(&install);
    let archive = manager.create(&BackupOptions::default()).unwrap();
    fs::remove_file(sidecar_path(&archive)).unwrap();

    let info = manager.backup_info(&archive).unwrap();
    assert!(info.metadata.checksum.is_empty());
    assert!(!manager.verify(&archive).unwrap());

    let target = tmp.path().join("restored");
    let report = manager
        .restore(
            &archive,
            &RestoreOptions {
                target_dir: Some(target.clone()),
                overwrite: false,
            },
        )
        .unwrap();
    assert_eq!(report.restored, 5);
    assert!(target.join("agents/nested/planner.md").exists());
}
