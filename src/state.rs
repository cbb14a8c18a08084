//! Process-wide progress/resume state (component C4).
//!
//! Grounded on the Python reference's `StateManager` singleton, but modeled
//! as a value owned by the runtime and shared via `Arc` rather than a global
//! singleton, per the redesign note on lazy-init singletons: internal
//! mutability is a single mutex around each record, exactly the "simple
//! memory-coherent update" the concurrency model calls for.

use std::{
    fs,
    io::Write,
    path::PathBuf,
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::constants::PACKAGE_EXPIRY;
use crate::error::StateError;

/// Lifecycle stage, shared across the in-memory progress record and the
/// persistent resume record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No operation in progress.
    Idle,
    /// Streaming package bytes to disk.
    Downloading,
    /// Hashing the downloaded package.
    Verifying,
    /// Verified and waiting for an `update` command.
    #[serde(rename = "to_install")]
    ToInstall,
    /// Deploying modules, running post_cmds, promoting the snapshot.
    Installing,
    /// Reserved for a future reboot-driven install path.
    Rebooting,
    /// Terminal: the operation completed.
    Success,
    /// Terminal: the operation failed.
    Failed,
}

/// In-memory, always-readable status tuple.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
    /// Current lifecycle stage.
    pub stage: Stage,
    /// Percentage complete, `0..=100`.
    pub progress: u32,
    /// Human-readable status message.
    pub message: String,
    /// Present iff `stage == Failed`, by convention.
    pub error: Option<String>,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            progress: 0,
            message: "Updater ready".to_string(),
            error: None,
        }
    }
}

/// Persistent resume record (`state.json`), enabling crash recovery and
/// resumable downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRecord {
    /// Version being downloaded/installed.
    pub version: String,
    /// Source URL.
    pub package_url: String,
    /// Target filename under `tmp/`.
    pub package_name: String,
    /// Declared total size in bytes.
    pub package_size: u64,
    /// Declared MD5, lowercase hex.
    pub package_md5: String,
    /// Bytes written so far.
    pub bytes_downloaded: u64,
    /// When this record was last updated.
    pub last_update: DateTime<Utc>,
    /// Current stage.
    pub stage: Stage,
    /// Set once the MD5 hash has been verified.
    pub verified_at: Option<DateTime<Utc>>,
}

impl ResumeRecord {
    /// A verified package older than [`PACKAGE_EXPIRY`] must be discarded
    /// before any new operation starts.
    pub fn is_expired(&self) -> bool {
        match self.verified_at {
            Some(verified_at) => {
                Utc::now().signed_duration_since(verified_at)
                    > chrono::Duration::from_std(PACKAGE_EXPIRY).unwrap()
            }
            None => false,
        }
    }

    fn is_well_formed(&self) -> bool {
        self.package_md5.len() == 32
            && self.package_md5.bytes().all(|b| b.is_ascii_hexdigit())
            && self.package_size > 0
            && (self.stage == Stage::Failed || self.bytes_downloaded <= self.package_size)
    }
}

/// Owns the in-memory progress tuple and the cached/backing resume record.
pub struct StateManager {
    state_file: PathBuf,
    progress: Mutex<ProgressRecord>,
    resume: Mutex<Option<ResumeRecord>>,
}

impl StateManager {
    /// Builds a manager backed by `state_file`, loading any existing record
    /// from disk (self-healing if it is corrupt).
    pub fn new(state_file: PathBuf) -> Self {
        let manager = Self {
            state_file,
            progress: Mutex::new(ProgressRecord::default()),
            resume: Mutex::new(None),
        };
        let loaded = manager.load_state();
        *manager.resume.lock().expect("resume mutex poisoned") = loaded;
        manager
    }

    /// Returns a clone of the current in-memory progress record. Never fails.
    pub fn get_status(&self) -> ProgressRecord {
        self.progress.lock().expect("progress mutex poisoned").clone()
    }

    /// Overwrites the in-memory progress tuple. Does not persist.
    pub fn update_status(&self, stage: Stage, progress: u32, message: impl Into<String>, error: Option<String>) {
        let mut guard = self.progress.lock().expect("progress mutex poisoned");
        *guard = ProgressRecord {
            stage,
            progress,
            message: message.into(),
            error,
        };
    }

    /// Loads `state.json` from disk. Malformed content is deleted and `None`
    /// is returned; this method never raises to the caller.
    pub fn load_state(&self) -> Option<ResumeRecord> {
        let content = match fs::read_to_string(&self.state_file) {
            Ok(content) => content,
            Err(_) => return None,
        };

        match serde_json::from_str::<ResumeRecord>(&content) {
            Ok(record) if record.is_well_formed() => Some(record),
            Ok(_) => {
                warn!(path = %self.state_file.display(), "resume record failed validation, deleting");
                let _ = fs::remove_file(&self.state_file);
                None
            }
            Err(err) => {
                error!(path = %self.state_file.display(), error = %err, "malformed state file, deleting");
                let _ = fs::remove_file(&self.state_file);
                None
            }
        }
    }

    /// Writes `record` to `state.json` (write-temp-then-rename) and updates
    /// the cached copy.
    pub fn save_state(&self, record: ResumeRecord) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(&record)?;

        let tmp_path = self.state_file.with_extension("json.tmp");
        if let Some(parent) = self.state_file.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let mut file = fs::File::create(&tmp_path).map_err(StateError::Write)?;
        file.write_all(&json).map_err(StateError::Write)?;
        file.sync_all().map_err(StateError::Write)?;
        fs::rename(&tmp_path, &self.state_file).map_err(StateError::Write)?;

        *self.resume.lock().expect("resume mutex poisoned") = Some(record);
        Ok(())
    }

    /// Deletes `state.json`, if present, and clears the cached copy.
    pub fn delete_state(&self) {
        let _ = fs::remove_file(&self.state_file);
        *self.resume.lock().expect("resume mutex poisoned") = None;
    }

    /// Returns the cached resume record without touching disk.
    pub fn get_persistent_state(&self) -> Option<ResumeRecord> {
        self.resume.lock().expect("resume mutex poisoned").clone()
    }

    /// Resets in-memory status to idle and clears the cached resume record
    /// (the backing file is left untouched; callers that want it gone call
    /// [`Self::delete_state`] explicitly).
    pub fn reset(&self) {
        *self.progress.lock().expect("progress mutex poisoned") = ProgressRecord::default();
    }
}
