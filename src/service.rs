//! OS-level service control (component C2).
//!
//! Wraps a configurable service-manager binary (`systemctl` by default) via
//! `std::process::Command`, the same subprocess-invocation style the daemon
//! this engine descends from uses in its own service start/stop paths.

use std::{
    process::Command,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::constants::SERVICE_POLL_INTERVAL;
use crate::error::ServiceError;

/// The states a unit's `systemctl is-active` output can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Running.
    Active,
    /// Mid-restart or mid-reload.
    Reloading,
    /// Stopped.
    Inactive,
    /// Exited with an error.
    Failed,
    /// Starting.
    Activating,
    /// Stopping.
    Deactivating,
    /// Output did not parse as any known state.
    Unknown,
}

impl From<&str> for ServiceStatus {
    fn from(value: &str) -> Self {
        match value.trim() {
            "active" => ServiceStatus::Active,
            "reloading" => ServiceStatus::Reloading,
            "inactive" => ServiceStatus::Inactive,
            "failed" => ServiceStatus::Failed,
            "activating" => ServiceStatus::Activating,
            "deactivating" => ServiceStatus::Deactivating,
            _ => ServiceStatus::Unknown,
        }
    }
}

/// Thin wrapper over a service-manager binary.
pub struct ServiceController {
    manager: String,
}

impl ServiceController {
    /// Builds a controller that shells out to `manager` (e.g. `systemctl`).
    pub fn new(manager: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
        }
    }

    /// Queries the current status of `name`. Non-parseable output (and any
    /// failure to invoke the manager) maps to [`ServiceStatus::Unknown`]
    /// rather than propagating an error, per the status-query contract.
    pub fn status(&self, name: &str) -> ServiceStatus {
        let output = Command::new(&self.manager)
            .arg("is-active")
            .arg(name)
            .output();

        match output {
            Ok(output) => ServiceStatus::from(String::from_utf8_lossy(&output.stdout).as_ref()),
            Err(err) => {
                warn!(service = name, error = %err, "failed to query service status");
                ServiceStatus::Unknown
            }
        }
    }

    /// Issues `stop` and polls until the service reports `inactive` or
    /// `timeout` elapses.
    pub fn stop(&self, name: &str, timeout: Duration) -> Result<(), ServiceError> {
        let output = Command::new(&self.manager)
            .arg("stop")
            .arg(name)
            .output()
            .map_err(|source| ServiceError::Spawn {
                service: name.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ServiceError::StopFailed {
                service: name.to_string(),
                exit: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        self.wait_for(name, ServiceStatus::Inactive, timeout, SERVICE_POLL_INTERVAL)
            .then_some(())
            .ok_or_else(|| ServiceError::StopTimeout(name.to_string()))
    }

    /// Issues `start` and polls until the service reports `active` or
    /// `timeout` elapses.
    pub fn start(&self, name: &str, timeout: Duration) -> Result<(), ServiceError> {
        let output = Command::new(&self.manager)
            .arg("start")
            .arg(name)
            .output()
            .map_err(|source| ServiceError::Spawn {
                service: name.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ServiceError::StartFailed {
                service: name.to_string(),
                exit: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        self.wait_for(name, ServiceStatus::Active, timeout, SERVICE_POLL_INTERVAL)
            .then_some(())
            .ok_or_else(|| ServiceError::StartTimeout(name.to_string()))
    }

    /// Polls `status(name)` every `interval` until it equals `target` or
    /// `timeout` elapses. Returns whether `target` was observed.
    pub fn wait_for(
        &self,
        name: &str,
        target: ServiceStatus,
        timeout: Duration,
        interval: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let current = self.status(name);
            debug!(service = name, ?current, "polled service status");
            if current == target {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(interval);
        }
    }
}
