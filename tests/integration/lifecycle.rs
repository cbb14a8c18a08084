#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{build_package, spawn_file_server, stub_service_manager, wait_for_stage};
use tempfile::tempdir;
use topeupdate::downloader::{DownloadRequest, Downloader};
use topeupdate::error::LifecycleError;
use topeupdate::installer::Installer;
use topeupdate::lifecycle::Lifecycle;
use topeupdate::reporter::Reporter;
use topeupdate::state::{Stage, StateManager};

fn setup(install_root: &std::path::Path) -> (Arc<StateManager>, Lifecycle) {
    let state = Arc::new(StateManager::new(install_root.join("state.json")));
    let reporter = Arc::new(Reporter::new("http://127.0.0.1:1"));
    let downloader = Arc::new(Downloader::new(
        install_root.to_path_buf(),
        Arc::clone(&state),
        Arc::clone(&reporter),
    ));
    let manager = stub_service_manager(install_root);
    let installer = Arc::new(Installer::new(
        install_root.to_path_buf(),
        manager.to_str().unwrap(),
        Arc::clone(&state),
        reporter,
    ));
    let lifecycle = Lifecycle::new(state.clone(), downloader, installer, install_root.to_path_buf());
    (state, lifecycle)
}

/// Full S1 flow driven through the lifecycle layer: a `download` command is
/// admitted and runs to `to_install`, then an `update` command is admitted
/// and runs to `success`, with `current` promoted.
#[test]
fn download_then_update_reaches_success() {
    let install_root = tempdir().expect("tempdir");
    let pkg_dir = tempdir().expect("tempdir");
    let (state, lifecycle) = setup(install_root.path());

    let manifest = format!(
        r#"{{"version":"1.0.0","modules":[{{"name":"m","src":"m/bin","dst":"{}/bin/m"}}]}}"#,
        install_root.path().display()
    );
    let package = build_package(pkg_dir.path(), "test-update-1.0.0.zip", &manifest, &[("m/bin", b"test")]);
    let body = std::fs::read(&package).unwrap();
    let url = spawn_file_server(body.clone());
    let md5 = topeupdate::verify::md5_of_file(&package).unwrap();

    lifecycle
        .start_download(DownloadRequest {
            version: "1.0.0".to_string(),
            package_url: url,
            package_name: "test-update-1.0.0.zip".to_string(),
            package_size: body.len() as u64,
            package_md5: md5,
        })
        .expect("download admitted");

    wait_for_stage(&state, Stage::ToInstall, Duration::from_secs(10));

    lifecycle.start_update("1.0.0").expect("update admitted");
    wait_for_stage(&state, Stage::Success, Duration::from_secs(10));

    assert!(install_root.path().join("versions/v1.0.0/bin/m").is_file());
}

/// S6 — a second `download` while one is already in flight is refused with
/// `Busy` and does not disturb the running task.
#[test]
fn concurrent_download_is_refused_while_busy() {
    let install_root = tempdir().expect("tempdir");
    let (state, lifecycle) = setup(install_root.path());

    state.update_status(Stage::Downloading, 40, "Downloading version 9.9.9...", None);

    let err = lifecycle
        .start_download(DownloadRequest {
            version: "9.9.9".to_string(),
            package_url: "http://127.0.0.1:1/pkg.zip".to_string(),
            package_name: "pkg.zip".to_string(),
            package_size: 10,
            package_md5: "600aff0f78265dd25bb6907828f916dd".to_string(),
        })
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Busy {
            stage: Stage::Downloading,
            progress: 40,
        }
    ));
    assert_eq!(state.get_status().progress, 40, "running task must be undisturbed");
}
