//! Constants and configuration values for the updater.
//!
//! This module centralizes magic numbers, file names, and timing values used
//! throughout the engine to keep them in one auditable place.

use std::time::Duration;

// ============================================================================
// File System Constants
// ============================================================================

/// Name of the persistent resume record stored under the tmp directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Subdirectory (relative to the install root) holding in-flight packages and `state.json`.
pub const TMP_DIR_NAME: &str = "tmp";

/// Subdirectory (relative to the install root) holding the rotating log file.
pub const LOG_DIR_NAME: &str = "logs";

/// Subdirectory (relative to the install root) holding version snapshots.
pub const VERSIONS_DIR_NAME: &str = "versions";

/// Name of the rotating log file.
pub const LOG_FILE_NAME: &str = "updater.log";

/// Name for the `current` snapshot symlink.
pub const CURRENT_LINK: &str = "current";

/// Name for the `previous` snapshot symlink.
pub const PREVIOUS_LINK: &str = "previous";

/// Name for the `factory` snapshot symlink.
pub const FACTORY_LINK: &str = "factory";

/// Default install root when not overridden by configuration or CLI flag.
pub const DEFAULT_INSTALL_ROOT: &str = "/opt/tope";

// ============================================================================
// Download Constants
// ============================================================================

/// Read/write chunk size used while streaming a download to disk.
pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Progress is persisted to `state.json` every time it advances by this many
/// percentage points.
pub const DOWNLOAD_PROGRESS_STEP: u32 = 5;

/// Read buffer size used by the MD5 verification pass.
pub const VERIFY_BUFFER_SIZE: usize = 8 * 1024;

/// A verified-but-not-installed package older than this is considered expired.
pub const PACKAGE_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Service Control Timing
// ============================================================================

/// Interval between `systemctl is-active` polls.
pub const SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default timeout for `stop`.
pub const SERVICE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for `start`.
pub const SERVICE_START_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Installer Constants
// ============================================================================

/// Wall-clock timeout for a single `post_cmds` entry.
pub const POST_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval used while polling a `post_cmds` child for completion.
pub const POST_CMD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bound on captured stdout+stderr bytes from a `post_cmds` invocation.
pub const POST_CMD_OUTPUT_CAP: usize = 16 * 1024;

// ============================================================================
// Reporter / Ingress Constants
// ============================================================================

/// Timeout for the fire-and-forget progress report POST.
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default port the HTTP ingress binds to.
pub const INGRESS_PORT: u16 = 12315;

/// Maximum request body size accepted by the ingress (guards against a
/// malformed `Content-Length` tying up a connection thread indefinitely).
pub const INGRESS_MAX_BODY: usize = 64 * 1024;

// ============================================================================
// Log Rotation
// ============================================================================

/// Rotate the log file once it exceeds this size.
pub const LOG_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Number of rotated backups to retain (`updater.log.1` .. `.3`).
pub const LOG_BACKUP_COUNT: u32 = 3;
