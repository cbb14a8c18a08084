//! Resolution of the filesystem layout the rest of the engine operates over.
//!
//! A single [`RuntimeContext`] is installed once at process start from the
//! loaded [`crate::config::Config`] and is read by every component that needs
//! a path (tmp dir, log dir, versions dir) rather than each one recomputing
//! it from scratch.

use std::{
    path::PathBuf,
    sync::{OnceLock, RwLock},
};

use crate::constants::{LOG_DIR_NAME, TMP_DIR_NAME, VERSIONS_DIR_NAME};

#[derive(Debug, Clone)]
struct RuntimeContext {
    install_root: PathBuf,
}

static CONTEXT: OnceLock<RwLock<RuntimeContext>> = OnceLock::new();

fn context_lock() -> &'static RwLock<RuntimeContext> {
    CONTEXT.get_or_init(|| {
        RwLock::new(RuntimeContext {
            install_root: PathBuf::from(crate::constants::DEFAULT_INSTALL_ROOT),
        })
    })
}

/// Installs the install root for the remainder of the process's lifetime.
/// Safe to call more than once (e.g. in tests with different temp roots).
pub fn init(install_root: PathBuf) {
    let mut guard = context_lock().write().expect("runtime context poisoned");
    guard.install_root = install_root;
}

/// The configured install root (default `/opt/tope`).
pub fn install_root() -> PathBuf {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .install_root
        .clone()
}

/// `<install_root>/tmp` — in-flight packages and `state.json`.
pub fn tmp_dir() -> PathBuf {
    install_root().join(TMP_DIR_NAME)
}

/// `<install_root>/logs` — rotating log file.
pub fn log_dir() -> PathBuf {
    install_root().join(LOG_DIR_NAME)
}

/// `<install_root>/versions` — snapshot tree.
pub fn versions_dir() -> PathBuf {
    install_root().join(VERSIONS_DIR_NAME)
}

/// `<install_root>/tmp/state.json`.
pub fn state_file_path() -> PathBuf {
    tmp_dir().join(crate::constants::STATE_FILE_NAME)
}

/// Creates `tmp/`, `logs/`, and `versions/` under the install root if absent.
pub fn bootstrap_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(tmp_dir())?;
    std::fs::create_dir_all(log_dir())?;
    std::fs::create_dir_all(versions_dir())?;
    Ok(())
}
