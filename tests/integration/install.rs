#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{build_package, stub_service_manager};
use tempfile::tempdir;
use topeupdate::error::InstallError;
use topeupdate::installer::Installer;
use topeupdate::reporter::Reporter;
use topeupdate::state::{Stage, StateManager};
use topeupdate::version_store::VersionStore;

/// S1 — a single-module package deploys its file under the snapshot
/// directory and promotes `current` to the installed version.
#[test]
fn happy_install_promotes_current() {
    let install_root = tempdir().expect("tempdir");
    let pkg_dir = tempdir().expect("tempdir");

    let manifest = format!(
        r#"{{"version":"1.0.0","modules":[{{"name":"m","src":"m/bin","dst":"{}/bin/m"}}]}}"#,
        install_root.path().display()
    );
    let package = build_package(pkg_dir.path(), "pkg.zip", &manifest, &[("m/bin", b"test")]);

    let state = Arc::new(StateManager::new(install_root.path().join("state.json")));
    let reporter = Arc::new(Reporter::new("http://127.0.0.1:1"));
    let manager = stub_service_manager(install_root.path());
    let installer = Installer::new(
        install_root.path().to_path_buf(),
        manager.to_str().unwrap(),
        Arc::clone(&state),
        reporter,
    );

    installer.install(&package, "1.0.0").expect("install succeeds");

    assert_eq!(state.get_status().stage, Stage::Success);
    let deployed = install_root.path().join("versions/v1.0.0/bin/m");
    assert_eq!(std::fs::read(&deployed).unwrap(), b"test");

    let versions = VersionStore::new(install_root.path().join("versions"));
    assert_eq!(versions.get_current_version().as_deref(), Some("1.0.0"));
}

/// S4-shaped — a failing `post_cmds` entry after file placement triggers the
/// two-level rollback ladder and leaves no `v<failed_version>` snapshot
/// behind.
#[test]
fn failed_post_cmd_triggers_rollback_to_previous() {
    let install_root = tempdir().expect("tempdir");
    let pkg_dir = tempdir().expect("tempdir");

    let versions = VersionStore::new(install_root.path().join("versions"));
    versions.create_version_dir("0.0.1").unwrap();
    versions.promote_version("0.0.1").unwrap();
    versions.set_factory_version("0.0.1").unwrap();
    versions.create_version_dir("0.9.0").unwrap();
    versions.promote_version("0.9.0").unwrap();

    let manifest = format!(
        r#"{{"version":"2.0.0","modules":[{{"name":"m","src":"m/bin","dst":"{}/bin/m","post_cmds":["exit 1"]}}]}}"#,
        install_root.path().display()
    );
    let package = build_package(pkg_dir.path(), "pkg.zip", &manifest, &[("m/bin", b"test")]);

    let state = Arc::new(StateManager::new(install_root.path().join("state.json")));
    let reporter = Arc::new(Reporter::new("http://127.0.0.1:1"));
    let manager = stub_service_manager(install_root.path());
    let installer = Installer::new(
        install_root.path().to_path_buf(),
        manager.to_str().unwrap(),
        Arc::clone(&state),
        reporter,
    );

    let err = installer.install(&package, "2.0.0").unwrap_err();
    assert!(matches!(err, InstallError::DeploymentFailed { .. }));
    assert_eq!(state.get_status().stage, Stage::Failed);

    assert_eq!(versions.get_current_version().as_deref(), Some("0.9.0"));
    assert!(!install_root.path().join("versions/v2.0.0").exists());
}
