//! Resumable streaming download with three-layer validation (component C6).
//!
//! Grounded on the Python reference's `DownloadService._download_with_resume`:
//! same Range-header resume check, same `Content-Length`-then-`declared_size`
//! validation order, same "keep state on transport failure, delete state on
//! validation failure" disposition, reimplemented over blocking `reqwest`
//! instead of `httpx`/`aiofiles`.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use tracing::{error, info};

use crate::constants::{DOWNLOAD_CHUNK_SIZE, DOWNLOAD_PROGRESS_STEP};
use crate::error::DownloadError;
use crate::reporter::Reporter;
use crate::state::{ResumeRecord, Stage, StateManager};
use crate::verify;

/// Parameters for a single download+verify operation.
pub struct DownloadRequest {
    /// Version being downloaded.
    pub version: String,
    /// Source URL.
    pub package_url: String,
    /// Target filename under `tmp/`.
    pub package_name: String,
    /// Declared size in bytes.
    pub package_size: u64,
    /// Declared MD5, already lowercased by the ingress layer.
    pub package_md5: String,
}

/// Streams a package to `<tmp_dir>/<package_name>`, resuming a partial
/// download when the cached resume record matches, then verifies it.
pub struct Downloader {
    tmp_dir: PathBuf,
    state: Arc<StateManager>,
    reporter: Arc<Reporter>,
    client: reqwest::blocking::Client,
}

impl Downloader {
    /// Builds a downloader writing into `tmp_dir`.
    pub fn new(tmp_dir: PathBuf, state: Arc<StateManager>, reporter: Arc<Reporter>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .build()
            .expect("reqwest client should always build with valid defaults");
        Self {
            tmp_dir,
            state,
            reporter,
            client,
        }
    }

    /// Runs the full download -> verify pipeline, updating `StateManager`
    /// and `Reporter` as it progresses.
    pub fn download(&self, request: DownloadRequest) -> Result<PathBuf, DownloadError> {
        let target_path = self.tmp_dir.join(&request.package_name);

        let bytes_downloaded = self.preflight(&request, &target_path)?;

        self.state.update_status(
            Stage::Downloading,
            percent(bytes_downloaded, request.package_size),
            format!("Downloading version {}...", request.version),
            None,
        );

        let result = self.download_with_resume(&request, &target_path, bytes_downloaded);

        if let Err(err) = &result {
            match err {
                DownloadError::SizeMismatch { .. } | DownloadError::Incomplete { .. } => {
                    let _ = std::fs::remove_file(&target_path);
                    self.state.delete_state();
                }
                DownloadError::Transport(_) | DownloadError::Io(_) => {
                    // Resume record is left on disk for a retry.
                }
                DownloadError::Verify(_) => unreachable!("verify errors are handled below"),
            }
            self.state
                .update_status(Stage::Failed, 0, "Download failed", Some(err.to_string()));
            self.reporter
                .report(Stage::Failed, 0, "Download failed", Some(&err.to_string()));
            return Err(result.unwrap_err());
        }

        info!(version = %request.version, "download complete, verifying MD5");
        self.state
            .update_status(Stage::Verifying, 0, "Verifying package integrity...", None);

        if let Err(err) = verify::verify(&target_path, &request.package_md5) {
            error!(error = %err, "MD5 verification failed");
            let _ = std::fs::remove_file(&target_path);

            let failed = ResumeRecord {
                version: request.version.clone(),
                package_url: request.package_url.clone(),
                package_name: request.package_name.clone(),
                package_size: request.package_size,
                package_md5: request.package_md5.clone(),
                bytes_downloaded: 0,
                last_update: Utc::now(),
                stage: Stage::Failed,
                verified_at: None,
            };
            let _ = self.state.save_state(failed);
            self.state.update_status(
                Stage::Failed,
                0,
                "MD5 verification failed",
                Some(err.to_string()),
            );
            self.reporter.report(
                Stage::Failed,
                0,
                "MD5 verification failed",
                Some(&err.to_string()),
            );
            return Err(DownloadError::Verify(err));
        }

        info!("MD5 verification passed");
        self.state.update_status(
            Stage::ToInstall,
            100,
            format!("Package ready to install: {}", request.version),
            None,
        );
        self.reporter.report(
            Stage::ToInstall,
            100,
            &format!("Package ready to install: {}", request.version),
            None,
        );

        Ok(target_path)
    }

    /// Decides whether an existing file at `target_path` is safe to resume
    /// or must be discarded, returning the byte offset to resume from.
    fn preflight(
        &self,
        request: &DownloadRequest,
        target_path: &Path,
    ) -> Result<u64, DownloadError> {
        if !target_path.exists() {
            return Ok(0);
        }

        let Some(persisted) = self.state.get_persistent_state() else {
            info!("found orphaned file without state.json, deleting and starting fresh");
            std::fs::remove_file(target_path)?;
            return Ok(0);
        };

        let matches = persisted.package_url == request.package_url
            && persisted.version == request.version
            && persisted.package_md5 == request.package_md5;

        if !matches {
            info!("existing file is from a different package, deleting and starting fresh");
            std::fs::remove_file(target_path)?;
            self.state.delete_state();
            return Ok(0);
        }

        let size = target_path.metadata()?.len();
        info!(bytes = size, "resuming download");
        Ok(size)
    }

    fn download_with_resume(
        &self,
        request: &DownloadRequest,
        target_path: &Path,
        mut bytes_downloaded: u64,
    ) -> Result<(), DownloadError> {
        let mut builder = self.client.get(&request.package_url);
        if bytes_downloaded > 0 {
            builder = builder.header("Range", format!("bytes={bytes_downloaded}-"));
        }

        let mut response = builder
            .send()
            .map_err(|e| DownloadError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| DownloadError::Transport(e.to_string()))?;

        let expected_from_server = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|len| len + bytes_downloaded);

        let mut file = if bytes_downloaded > 0 {
            OpenOptions::new().append(true).open(target_path)?
        } else {
            File::create(target_path)?
        };

        let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        let mut last_progress: i64 = -1;

        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| DownloadError::Transport(e.to_string()))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            bytes_downloaded += n as u64;

            let current_progress = percent(bytes_downloaded, request.package_size) as i64;
            if current_progress >= last_progress + DOWNLOAD_PROGRESS_STEP as i64 {
                last_progress = current_progress;
                self.state.update_status(
                    Stage::Downloading,
                    current_progress as u32,
                    format!("Downloading version {}...", request.version),
                    None,
                );
                let record = ResumeRecord {
                    version: request.version.clone(),
                    package_url: request.package_url.clone(),
                    package_name: request.package_name.clone(),
                    package_size: request.package_size,
                    package_md5: request.package_md5.clone(),
                    bytes_downloaded,
                    last_update: Utc::now(),
                    stage: Stage::Downloading,
                    verified_at: None,
                };
                let _ = self.state.save_state(record);
            }
        }

        info!(bytes_downloaded, "HTTP transfer completed");

        if let Some(expected) = expected_from_server
            && bytes_downloaded != expected
        {
            return Err(DownloadError::Incomplete {
                expected,
                actual: bytes_downloaded,
            });
        }

        if bytes_downloaded != request.package_size {
            return Err(DownloadError::SizeMismatch {
                expected: request.package_size,
                actual: bytes_downloaded,
            });
        }

        Ok(())
    }
}

fn percent(done: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0) as u32
}
