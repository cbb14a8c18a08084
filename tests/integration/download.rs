#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use common::spawn_file_server;
use tempfile::tempdir;
use topeupdate::downloader::{DownloadRequest, Downloader};
use topeupdate::error::DownloadError;
use topeupdate::reporter::Reporter;
use topeupdate::state::{Stage, StateManager};

fn harness(dir: &std::path::Path) -> (Arc<StateManager>, Downloader) {
    let state = Arc::new(StateManager::new(dir.join("state.json")));
    let reporter = Arc::new(Reporter::new("http://127.0.0.1:1"));
    let downloader = Downloader::new(dir.to_path_buf(), Arc::clone(&state), reporter);
    (state, downloader)
}

/// S1 — happy download of the 468-byte package from the spec's acceptance
/// scenario, ending at `to_install` with the file verified on disk.
#[test]
fn happy_download_ends_at_to_install() {
    let dir = tempdir().expect("tempdir");
    let body = b"test".repeat(117); // 468 bytes
    let url = spawn_file_server(body.clone());
    let (state, downloader) = harness(dir.path());

    let reference = dir.path().join("reference");
    std::fs::write(&reference, &body).unwrap();
    let md5 = topeupdate::verify::md5_of_file(&reference).unwrap();

    let request = DownloadRequest {
        version: "1.0.0".to_string(),
        package_url: url,
        package_name: "test-update-1.0.0.zip".to_string(),
        package_size: body.len() as u64,
        package_md5: md5,
    };

    let path = downloader.download(request).expect("download succeeds");
    assert!(path.is_file());
    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert_eq!(state.get_status().stage, Stage::ToInstall);
    assert_eq!(state.get_status().progress, 100);
}

/// S2 — declared MD5 does not match the downloaded bytes.
#[test]
fn md5_mismatch_deletes_file_and_reports_failed() {
    let dir = tempdir().expect("tempdir");
    let body = b"test".repeat(117);
    let url = spawn_file_server(body.clone());
    let (state, downloader) = harness(dir.path());

    let request = DownloadRequest {
        version: "1.0.0".to_string(),
        package_url: url,
        package_name: "bad-md5.zip".to_string(),
        package_size: body.len() as u64,
        package_md5: "00000000000000000000000000000000".to_string(),
    };

    let err = downloader.download(request).unwrap_err();
    assert!(matches!(err, DownloadError::Verify(_)));
    assert!(!dir.path().join("bad-md5.zip").exists());
    assert_eq!(state.get_status().stage, Stage::Failed);

    let record = state.load_state().expect("failed record persisted");
    assert_eq!(record.stage, Stage::Failed);
    assert_eq!(record.bytes_downloaded, 0);
}

/// S3 — declared size does not match the server's actual payload.
#[test]
fn size_mismatch_deletes_file_and_state() {
    let dir = tempdir().expect("tempdir");
    let body = b"test".repeat(117);
    let url = spawn_file_server(body.clone());
    let (state, downloader) = harness(dir.path());

    let request = DownloadRequest {
        version: "1.0.0".to_string(),
        package_url: url,
        package_name: "wrong-size.zip".to_string(),
        package_size: 999_999,
        package_md5: "600aff0f78265dd25bb6907828f916dd".to_string(),
    };

    let err = downloader.download(request).unwrap_err();
    assert!(matches!(err, DownloadError::SizeMismatch { .. }));
    assert!(!dir.path().join("wrong-size.zip").exists());
    assert!(state.get_persistent_state().is_none());
}

/// S5 (download half) — a download interrupted after a partial write
/// resumes from the cached byte offset and still ends up fully verified.
#[test]
fn resumed_download_completes_and_verifies() {
    let dir = tempdir().expect("tempdir");
    let body: Vec<u8> = (0u32..20_000).flat_map(|n| n.to_le_bytes()).collect();
    let url = spawn_file_server(body.clone());
    let (state, downloader) = harness(dir.path());

    let md5 = {
        let tmp = dir.path().join("reference");
        std::fs::write(&tmp, &body).unwrap();
        topeupdate::verify::md5_of_file(&tmp).unwrap()
    };

    let package_name = "resumable.bin".to_string();
    let partial_len = body.len() / 3;
    std::fs::write(dir.path().join(&package_name), &body[..partial_len]).unwrap();
    state
        .save_state(topeupdate::state::ResumeRecord {
            version: "2.0.0".to_string(),
            package_url: url.clone(),
            package_name: package_name.clone(),
            package_size: body.len() as u64,
            package_md5: md5.clone(),
            bytes_downloaded: partial_len as u64,
            last_update: chrono::Utc::now(),
            stage: Stage::Downloading,
            verified_at: None,
        })
        .unwrap();

    let request = DownloadRequest {
        version: "2.0.0".to_string(),
        package_url: url,
        package_name,
        package_size: body.len() as u64,
        package_md5: md5,
    };

    let path = downloader.download(request).expect("resumed download succeeds");
    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert_eq!(state.get_status().stage, Stage::ToInstall);
}
