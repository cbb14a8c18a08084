#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use chrono::Utc;
use common::stub_service_manager;
use tempfile::tempdir;
use topeupdate::downloader::Downloader;
use topeupdate::installer::Installer;
use topeupdate::lifecycle::Lifecycle;
use topeupdate::reporter::Reporter;
use topeupdate::state::{ResumeRecord, Stage, StateManager};

fn lifecycle_over(dir: &std::path::Path, state: Arc<StateManager>) -> Lifecycle {
    let reporter = Arc::new(Reporter::new("http://127.0.0.1:1"));
    let downloader = Arc::new(Downloader::new(
        dir.to_path_buf(),
        Arc::clone(&state),
        Arc::clone(&reporter),
    ));
    let manager = stub_service_manager(dir);
    let installer = Arc::new(Installer::new(
        dir.to_path_buf(),
        manager.to_str().unwrap(),
        Arc::clone(&state),
        reporter,
    ));
    Lifecycle::new(state, downloader, installer, dir.to_path_buf())
}

fn base_record(stage: Stage) -> ResumeRecord {
    ResumeRecord {
        version: "1.0.0".to_string(),
        package_url: "https://example.com/pkg.zip".to_string(),
        package_name: "pkg.zip".to_string(),
        package_size: 468,
        package_md5: "600aff0f78265dd25bb6907828f916dd".to_string(),
        bytes_downloaded: 0,
        last_update: Utc::now(),
        stage,
        verified_at: None,
    }
}

/// "`state.json` malformed on disk at startup -> removed, Lifecycle reports
/// idle, no crash."
#[test]
fn malformed_state_file_heals_to_idle() {
    let dir = tempdir().expect("tempdir");
    let state_path = dir.path().join("state.json");
    std::fs::write(&state_path, b"{not valid json").unwrap();

    let state = Arc::new(StateManager::new(state_path.clone()));
    assert!(!state_path.exists(), "malformed file is deleted on load");

    let lifecycle = lifecycle_over(dir.path(), state.clone());
    lifecycle.self_heal();

    assert_eq!(state.get_status().stage, Stage::Idle);
}

/// A verified package older than the expiry window is discarded at startup
/// rather than resumed into `to_install`.
#[test]
fn expired_resume_record_is_discarded_at_startup() {
    let dir = tempdir().expect("tempdir");
    let pkg_path = dir.path().join("pkg.zip");
    std::fs::write(&pkg_path, b"stale package bytes").unwrap();

    let mut record = base_record(Stage::ToInstall);
    record.bytes_downloaded = record.package_size;
    record.verified_at = Some(Utc::now() - chrono::Duration::hours(25));

    let state = Arc::new(StateManager::new(dir.path().join("state.json")));
    state.save_state(record).unwrap();

    let lifecycle = lifecycle_over(dir.path(), state.clone());
    lifecycle.self_heal();

    assert!(!pkg_path.exists());
    assert!(state.get_persistent_state().is_none());
    assert_eq!(state.get_status().stage, Stage::Idle);
}

/// A `to_install` record whose `bytes_downloaded` exceeds its declared size
/// is treated as corrupt and discarded, not resumed.
#[test]
fn oversized_to_install_record_is_treated_as_corrupt() {
    let dir = tempdir().expect("tempdir");
    let pkg_path = dir.path().join("pkg.zip");
    std::fs::write(&pkg_path, b"more bytes than declared").unwrap();

    let mut record = base_record(Stage::ToInstall);
    record.bytes_downloaded = record.package_size + 1;

    let state = Arc::new(StateManager::new(dir.path().join("state.json")));
    state.save_state(record).unwrap();

    let lifecycle = lifecycle_over(dir.path(), state.clone());
    lifecycle.self_heal();

    assert!(!pkg_path.exists());
    assert_eq!(state.get_status().stage, Stage::Idle);
}

/// A prior failure is resumed in-memory as `failed`, ready for retry,
/// without touching the persisted record.
#[test]
fn failed_record_resumes_as_failed_and_keeps_state() {
    let dir = tempdir().expect("tempdir");
    let state = Arc::new(StateManager::new(dir.path().join("state.json")));
    state.save_state(base_record(Stage::Failed)).unwrap();

    let lifecycle = lifecycle_over(dir.path(), state.clone());
    lifecycle.self_heal();

    assert_eq!(state.get_status().stage, Stage::Failed);
    assert!(state.get_persistent_state().is_some());
}

/// A well-formed `to_install` record resumes with full progress, ready for
/// an `update` command without re-downloading.
#[test]
fn to_install_record_resumes_ready_for_update() {
    let dir = tempdir().expect("tempdir");
    let mut record = base_record(Stage::ToInstall);
    record.bytes_downloaded = record.package_size;

    let state = Arc::new(StateManager::new(dir.path().join("state.json")));
    state.save_state(record).unwrap();

    let lifecycle = lifecycle_over(dir.path(), state.clone());
    lifecycle.self_heal();

    assert_eq!(state.get_status().stage, Stage::ToInstall);
    assert_eq!(state.get_status().progress, 100);
}
