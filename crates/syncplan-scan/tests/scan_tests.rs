use std::fs;

use syncplan_scan::{Checksum, EntryKind, EntryPath, InventoryScanner, ScanConfig, hash_file};
use tempfile::TempDir;

fn path(p: &str) -> EntryPath {
    EntryPath::new(p).unwrap()
}

fn create_share() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    fs::create_dir_all(root.join("docs/drafts")).unwrap();
    fs::create_dir(root.join("build")).unwrap();
    fs::write(root.join("docs/readme.md"), "# readme").unwrap();
    fs::write(root.join("docs/drafts/plan.md"), "draft").unwrap();
    fs::write(root.join("build/output.log"), "noise").unwrap();
    fs::write(root.join(".hidden"), "secret").unwrap();

    temp
}

#[test]
fn test_scan_records_every_kind() {
    let temp = create_share();
    let inventory = InventoryScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

    assert_eq!(inventory.get(&path("docs")).unwrap().kind(), EntryKind::Directory);
    assert_eq!(inventory.get(&path("docs/drafts/plan.md")).unwrap().kind(), EntryKind::File);
    assert!(inventory.contains(&path(".hidden")));
    assert!(inventory.check_structure().is_ok());
}

#[test]
fn test_directories_never_carry_checksums() {
    let temp = create_share();
    let inventory = InventoryScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

    for entry in &inventory {
        if entry.is_dir() {
            assert!(entry.checksum().is_none(), "{}", entry.path());
        } else if entry.is_file() {
            assert!(entry.checksum().is_some(), "{}", entry.path());
        }
    }
}

#[test]
fn test_ignore_patterns_prune_directories() {
    let temp = create_share();
    let config = ScanConfig::builder()
        .root(temp.path())
        .ignore_patterns(vec!["build".to_string()])
        .build()
        .unwrap();

    let inventory = InventoryScanner::new().scan(&config).unwrap();

    assert!(!inventory.contains(&path("build")));
    assert!(!inventory.contains(&path("build/output.log")));
    assert!(inventory.contains(&path("docs/readme.md")));
}

#[test]
fn test_hidden_files_can_be_skipped() {
    let temp = create_share();
    let config = ScanConfig::builder()
        .root(temp.path())
        .include_hidden(false)
        .build()
        .unwrap();

    let inventory = InventoryScanner::new().scan(&config).unwrap();
    assert!(!inventory.contains(&path(".hidden")));
}

#[test]
fn test_depth_limit_marks_partial_regions() {
    let temp = create_share();
    let config = ScanConfig::builder()
        .root(temp.path())
        .max_depth(Some(1))
        .build()
        .unwrap();

    let inventory = InventoryScanner::new().scan(&config).unwrap();

    assert!(inventory.contains(&path("docs")));
    assert!(!inventory.contains(&path("docs/readme.md")));
    assert!(inventory.is_partial_at(&path("docs/readme.md")));
    assert!(!inventory.is_partial_at(&path(".hidden")));
}

#[test]
fn test_checksums_can_be_disabled() {
    let temp = create_share();
    let config = ScanConfig::builder()
        .root(temp.path())
        .compute_checksums(false)
        .build()
        .unwrap();

    let inventory = InventoryScanner::new().scan(&config).unwrap();
    let readme = inventory.get(&path("docs/readme.md")).unwrap();
    assert!(readme.checksum().is_none());
    assert_eq!(readme.size(), 8);
}

#[test]
fn test_hash_file_matches_in_memory_checksum() {
    let temp = create_share();
    let sum = hash_file(&temp.path().join("docs/readme.md")).unwrap();
    assert_eq!(sum, Checksum::of(b"# readme"));
}

#[test]
fn test_scan_rejects_file_root() {
    let temp = create_share();
    let result = InventoryScanner::new().scan(&ScanConfig::new(temp.path().join("docs/readme.md")));
    assert!(result.is_err());
}

#[cfg(unix)]
#[test]
fn test_symlink_entries() {
    let temp = create_share();
    std::os::unix::fs::symlink("docs/readme.md", temp.path().join("link")).unwrap();

    let inventory = InventoryScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();
    let link = inventory.get(&path("link")).unwrap();

    assert_eq!(link.kind(), EntryKind::Symlink);
    assert_eq!(link.checksum(), Some(Checksum::of(b"docs/readme.md")));
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_is_partial() {
    use std::os::unix::fs::PermissionsExt;
    use syncplan_scan::WarningKind;

    let temp = create_share();
    let locked = temp.path().join("docs/drafts");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root ignores directory permissions, so there is nothing to observe.
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = InventoryScanner::new().scan(&ScanConfig::new(temp.path()));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    let inventory = result.unwrap();

    assert!(inventory.contains(&path("docs/drafts")));
    assert!(!inventory.contains(&path("docs/drafts/plan.md")));
    assert!(inventory.is_partial_at(&path("docs/drafts/plan.md")));
    assert!(!inventory.is_partial_at(&path("docs/readme.md")));
    assert!(inventory.has_warnings());
    assert!(
        inventory
            .warnings
            .iter()
            .any(|w| w.path == "docs/drafts" && w.kind == WarningKind::PermissionDenied)
    );
}
