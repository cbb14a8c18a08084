#[path = "common/mod.rs"]
mod common;

use std::os::unix::fs::PermissionsExt;

use tempfile::tempdir;
use topeupdate::version_store::VersionStore;

/// Builds the S4 pre-state: `v1.0.0` current, `v0.9.0` previous, `v0.0.1`
/// factory (read-only), then walks the two-level rollback ladder by hand.
#[test]
fn two_level_rollback_ladder_prefers_previous_over_factory() {
    let dir = tempdir().expect("tempdir");
    let store = VersionStore::new(dir.path());

    store.create_version_dir("0.0.1").unwrap();
    store.promote_version("0.0.1").unwrap();
    store.set_factory_version("0.0.1").unwrap();

    store.create_version_dir("0.9.0").unwrap();
    store.promote_version("0.9.0").unwrap();

    store.create_version_dir("1.0.0").unwrap();
    store.promote_version("1.0.0").unwrap();

    assert_eq!(store.get_current_version().as_deref(), Some("1.0.0"));
    assert_eq!(store.get_previous_version().as_deref(), Some("0.9.0"));
    assert_eq!(store.get_factory_version().as_deref(), Some("0.0.1"));

    let restored = store.rollback_to_previous().expect("level 1 rollback");
    assert_eq!(restored, "0.9.0");
    assert_eq!(store.get_current_version().as_deref(), Some("0.9.0"));
}

#[test]
fn factory_rollback_used_when_there_is_no_previous() {
    let dir = tempdir().expect("tempdir");
    let store = VersionStore::new(dir.path());

    store.create_version_dir("0.0.1").unwrap();
    store.promote_version("0.0.1").unwrap();
    store.set_factory_version("0.0.1").unwrap();

    assert!(store.rollback_to_previous().is_err());
    let restored = store.rollback_to_factory().expect("level 2 rollback");
    assert_eq!(restored, "0.0.1");
}

#[test]
fn factory_snapshot_is_read_only_after_being_set() {
    let dir = tempdir().expect("tempdir");
    let store = VersionStore::new(dir.path());

    let version_dir = store.create_version_dir("0.0.1").unwrap();
    let module = version_dir.join("bin");
    std::fs::write(&module, b"test").unwrap();
    store.promote_version("0.0.1").unwrap();
    store.set_factory_version("0.0.1").unwrap();

    let perms = std::fs::metadata(&module).unwrap().permissions();
    assert_eq!(perms.mode() & 0o222, 0, "factory files must not be writable");
}
