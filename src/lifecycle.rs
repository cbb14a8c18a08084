//! Admission control and startup self-heal (component C8).
//!
//! The admission gate and recovery table are new to this engine; both are
//! expressed as pure functions over [`crate::state::Stage`] so the ingress
//! layer and `main.rs` can call them without owning any locking themselves,
//! in the same spirit as the daemon's `RuntimeContext` accessors being cheap,
//! side-effect-free reads.

use std::{path::PathBuf, sync::Arc};

use tracing::{info, warn};

use crate::downloader::{DownloadRequest, Downloader};
use crate::error::LifecycleError;
use crate::installer::Installer;
use crate::state::{Stage, StateManager};

/// Coordinates admission checks and background dispatch for `download` and
/// `update` commands.
pub struct Lifecycle {
    state: Arc<StateManager>,
    downloader: Arc<Downloader>,
    installer: Arc<Installer>,
    tmp_dir: PathBuf,
}

impl Lifecycle {
    /// Builds a lifecycle coordinator sharing `state` with the ingress layer.
    pub fn new(
        state: Arc<StateManager>,
        downloader: Arc<Downloader>,
        installer: Arc<Installer>,
        tmp_dir: PathBuf,
    ) -> Self {
        Self {
            state,
            downloader,
            installer,
            tmp_dir,
        }
    }

    /// Runs the startup recovery table against whatever `state.json` holds.
    pub fn self_heal(&self) {
        let Some(record) = self.state.get_persistent_state() else {
            info!("no resume record on disk, starting idle");
            return;
        };

        if record.is_expired() {
            info!(version = %record.version, "resume record expired at startup, discarding");
            self.discard(&record.package_name);
            return;
        }

        match record.stage {
            Stage::Downloading | Stage::Verifying => {
                warn!(stage = ?record.stage, "interrupted mid-transfer at startup, discarding");
                self.discard(&record.package_name);
            }
            Stage::Failed => {
                info!("resuming in failed state, ready for retry");
                self.state.update_status(
                    Stage::Failed,
                    0,
                    "Previous operation failed, ready for retry",
                    None,
                );
            }
            Stage::ToInstall if record.bytes_downloaded > record.package_size => {
                warn!("resume record size exceeds declared size, treating as corrupt");
                self.discard(&record.package_name);
            }
            other => {
                info!(stage = ?other, "resuming in-memory status from resume record");
                self.state.update_status(
                    other,
                    if other == Stage::ToInstall { 100 } else { 0 },
                    format!("Resumed at stage {other:?}"),
                    None,
                );
            }
        }
    }

    fn discard(&self, package_name: &str) {
        let _ = std::fs::remove_file(self.tmp_dir.join(package_name));
        self.state.delete_state();
        self.state.update_status(Stage::Idle, 0, "Updater ready", None);
    }

    /// Admits a `download` command, or reports why it is refused.
    pub fn admit_download(&self) -> Result<(), LifecycleError> {
        let status = self.state.get_status();
        match status.stage {
            Stage::Idle | Stage::Failed | Stage::Success => {
                if let Some(record) = self.state.get_persistent_state()
                    && record.is_expired()
                {
                    return Err(LifecycleError::Expired);
                }
                Ok(())
            }
            other => Err(LifecycleError::Busy {
                stage: other,
                progress: status.progress,
            }),
        }
    }

    /// Admits and starts a `download` command in a background thread.
    pub fn start_download(&self, request: DownloadRequest) -> Result<(), LifecycleError> {
        self.admit_download()?;
        let downloader = Arc::clone(&self.downloader);
        std::thread::spawn(move || {
            if let Err(err) = downloader.download(request) {
                warn!(error = %err, "download task ended with an error");
            }
        });
        Ok(())
    }

    /// Admits an `update(version)` command, returning the package path to
    /// install on success.
    pub fn admit_update(&self, version: &str) -> Result<PathBuf, LifecycleError> {
        let status = self.state.get_status();
        match status.stage {
            Stage::Idle | Stage::ToInstall | Stage::Success | Stage::Failed => {}
            other => {
                return Err(LifecycleError::Busy {
                    stage: other,
                    progress: status.progress,
                })
            }
        }

        let record = self
            .state
            .get_persistent_state()
            .filter(|r| r.version == version)
            .ok_or_else(|| LifecycleError::NotFound(version.to_string()))?;

        if record.is_expired() {
            return Err(LifecycleError::Expired);
        }

        Ok(self.tmp_dir.join(&record.package_name))
    }

    /// Admits and starts an `update(version)` command in a background thread.
    pub fn start_update(&self, version: &str) -> Result<(), LifecycleError> {
        let package_path = self.admit_update(version)?;
        let installer = Arc::clone(&self.installer);
        let version = version.to_string();
        std::thread::spawn(move || {
            if let Err(err) = installer.install(&package_path, &version) {
                warn!(error = %err, "install task ended with an error");
            }
        });
        Ok(())
    }
}
