//! Error taxonomy for the updater engine.
//!
//! Errors are split per concern rather than collapsed into one enum, mirroring
//! how the daemon this engine is descended from separates `PidFileError` and
//! `ServiceStateError` out of its top-level error type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from [`crate::verify`].
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The file could not be opened or read.
    #[error("failed to read '{path}': {source}")]
    Io {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// `expected_md5` was not a 32-character lowercase hex string.
    #[error("INVALID_HASH_FORMAT: '{0}' is not a 32-character hex digest")]
    InvalidHashFormat(String),

    /// The computed digest did not match the expected one.
    #[error("MD5_MISMATCH: expected {expected}, got {actual}")]
    Mismatch {
        /// Digest the caller expected.
        expected: String,
        /// Digest actually computed.
        actual: String,
    },
}

/// Errors from [`crate::service`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// `stop` did not observe `inactive` within the timeout.
    #[error("SERVICE_STOP_TIMEOUT: '{0}' did not become inactive in time")]
    StopTimeout(String),

    /// The stop command itself exited non-zero.
    #[error("SERVICE_STOP_FAILED: '{service}' exit={exit:?}: {stderr}")]
    StopFailed {
        /// Service name.
        service: String,
        /// Process exit code, if any.
        exit: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },

    /// `start` did not observe `active` within the timeout.
    #[error("SERVICE_START_TIMEOUT: '{0}' did not become active in time")]
    StartTimeout(String),

    /// The start command itself exited non-zero.
    #[error("SERVICE_START_FAILED: '{service}' exit={exit:?}: {stderr}")]
    StartFailed {
        /// Service name.
        service: String,
        /// Process exit code, if any.
        exit: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },

    /// Failed to spawn the service-manager subprocess at all.
    #[error("failed to invoke service manager for '{service}': {source}")]
    Spawn {
        /// Service name.
        service: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from [`crate::version_store`].
#[derive(Debug, Error)]
pub enum VersionStoreError {
    /// `create_version_dir` was called for a version that already has a directory.
    #[error("ALREADY_EXISTS: version directory for '{0}' already exists")]
    AlreadyExists(String),

    /// A rollback or read was attempted but the named snapshot directory is missing.
    #[error("NOT_FOUND: version directory for '{0}' does not exist")]
    NotFound(String),

    /// `rollback_to_previous` was called with no `previous` link set.
    #[error("NO_PREVIOUS: no previous version is recorded")]
    NoPrevious,

    /// `rollback_to_factory` was called with no `factory` link set.
    #[error("NO_FACTORY: no factory version is recorded")]
    NoFactory,

    /// `set_factory_version` was called a second time.
    #[error("factory version is already set to '{0}'")]
    FactoryAlreadySet(String),

    /// An attempt was made to delete `current`, `previous`, or `factory`.
    #[error("refusing to delete protected version '{0}'")]
    ProtectedVersion(String),

    /// Underlying filesystem operation failed.
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from [`crate::state`].
#[derive(Debug, Error)]
pub enum StateError {
    /// Failed to write `state.json`.
    #[error("failed to persist state file: {0}")]
    Write(#[source] std::io::Error),

    /// Failed to serialize the resume record.
    #[error("failed to serialize resume record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from [`crate::manifest`].
#[derive(Debug, Error)]
pub enum ManifestError {
    /// `manifest.json` could not be parsed as valid JSON / schema.
    #[error("INVALID_MANIFEST: {0}")]
    Invalid(String),

    /// `manifest.version` did not match the version being installed.
    #[error("VERSION_MISMATCH: manifest declares '{manifest}', expected '{expected}'")]
    VersionMismatch {
        /// Version found in the manifest.
        manifest: String,
        /// Version the installer was asked to install.
        expected: String,
    },
}

/// Errors from [`crate::downloader`].
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A network or HTTP-level failure occurred; the resume record is kept.
    #[error("DOWNLOAD_FAILED: {0}")]
    Transport(String),

    /// The server's `Content-Length` disagreed with bytes actually received.
    #[error("INCOMPLETE_DOWNLOAD: expected {expected} bytes, received {actual}")]
    Incomplete {
        /// Bytes the server said it would send (plus bytes already on disk).
        expected: u64,
        /// Bytes actually received.
        actual: u64,
    },

    /// The declared `package_size` disagreed with bytes actually written.
    #[error("PACKAGE_SIZE_MISMATCH: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Declared size.
        expected: u64,
        /// Actual size on disk.
        actual: u64,
    },

    /// Post-download hash verification failed.
    #[error("{0}")]
    Verify(#[from] VerifyError),

    /// Local filesystem operation failed.
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Composite outcome of the two-level rollback protocol.
#[derive(Debug, Error)]
pub enum RollbackOutcome {
    /// Level 1 (previous) succeeded and services came back healthy.
    #[error("ROLLBACK_LEVEL_1_SUCCESS: restored previous version '{0}'")]
    Level1Success(String),

    /// Level 2 (factory) succeeded after level 1 failed or was unhealthy.
    #[error("ROLLBACK_LEVEL_2_SUCCESS: restored factory version '{0}'")]
    Level2Success(String),

    /// Both levels failed; manual intervention is required.
    #[error(
        "ROLLBACK_LEVEL_2_FAILED: manual intervention required; level1={level1}, level2={level2}"
    )]
    BothFailed {
        /// Human-readable summary of why level 1 failed.
        level1: String,
        /// Human-readable summary of why level 2 failed.
        level2: String,
    },
}

/// Errors from [`crate::installer`].
#[derive(Debug, Error)]
pub enum InstallError {
    /// The manifest inside the package failed to parse or validate.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Stopping a service before deployment failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A module's `post_cmds` entry failed.
    #[error("POST_CMD_FAILED: '{command}' exited with {exit:?}: {stderr}")]
    PostCmdFailed {
        /// The command that failed.
        command: String,
        /// Exit code, if the process ran to completion.
        exit: Option<i32>,
        /// Captured stderr, bounded.
        stderr: String,
    },

    /// A module's `post_cmds` entry exceeded its wall-clock timeout.
    #[error("POST_CMD_TIMEOUT: '{0}' did not complete in time")]
    PostCmdTimeout(String),

    /// Deployed module content failed post-deploy verification.
    #[error("verification failed for module '{0}': expected file not found")]
    VerificationFailed(String),

    /// Archive I/O (zip reading, extraction) failed.
    #[error("archive error: {0}")]
    Archive(String),

    /// Filesystem error while staging module content.
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// Version-store interaction (create/promote) failed.
    #[error(transparent)]
    VersionStore(#[from] VersionStoreError),

    /// A composite failure after deployment began; carries the rollback outcome.
    #[error("DEPLOYMENT_FAILED: {cause}; {rollback}")]
    DeploymentFailed {
        /// What triggered the rollback.
        cause: String,
        /// What the rollback attempt achieved.
        rollback: RollbackOutcome,
    },
}

/// Errors from [`crate::config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Read(#[source] std::io::Error),

    /// Failed to parse the configuration file as YAML.
    #[error("invalid YAML format: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Application-level admission failures from [`crate::lifecycle`]. These map
/// onto ingress response codes rather than transport-level HTTP errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Another operation already owns the current stage.
    #[error("Operation already in progress: {stage:?}")]
    Busy {
        /// The stage currently occupying the engine.
        stage: crate::state::Stage,
        /// Its last reported progress.
        progress: u32,
    },

    /// The cached resume record is older than [`crate::constants::PACKAGE_EXPIRY`].
    #[error("Package expired (>24h after verification)")]
    Expired,

    /// `update(version)` was called with no matching resume record.
    #[error("no downloaded package matches version '{0}'")]
    NotFound(String),
}

/// Errors surfaced by the HTTP ingress layer when validating a request body.
#[derive(Debug, Error)]
pub enum IngressError {
    /// The request could not be parsed as HTTP/1.1 at all.
    #[error("malformed HTTP request: {0}")]
    MalformedRequest(String),

    /// A field in the JSON body failed validation.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The body could not be parsed as JSON.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}
