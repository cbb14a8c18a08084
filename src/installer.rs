//! Manifest-driven installation and two-level rollback (component C7).
//!
//! The eight-phase workflow and rollback ladder are new to this engine (the
//! Python reference's `InstallerService` plus `VersionManager`'s rollback
//! helpers have no single-file analogue); `post_cmds` execution follows the
//! daemon's `sh -c`-spawning style from [`crate::service`]/the teacher's
//! process manager, generalized with a wall-clock timeout and bounded output
//! capture since an install-time hook, unlike a supervised service, must not
//! be allowed to hang the installer forever.

use std::{
    fs,
    io::Read,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{info, warn};
use zip::ZipArchive;

use crate::constants::{
    POST_CMD_OUTPUT_CAP, POST_CMD_POLL_INTERVAL, POST_CMD_TIMEOUT, SERVICE_START_TIMEOUT,
    SERVICE_STOP_TIMEOUT,
};
use crate::error::{InstallError, RollbackOutcome};
use crate::manifest::Manifest;
use crate::reporter::Reporter;
use crate::service::{ServiceController, ServiceStatus};
use crate::state::{Stage, StateManager};
use crate::version_store::VersionStore;

/// Drives a single `install(package_path, version)` operation end to end.
pub struct Installer {
    versions: VersionStore,
    services: ServiceController,
    state: Arc<StateManager>,
    reporter: Arc<Reporter>,
    install_root: PathBuf,
}

impl Installer {
    /// Builds an installer operating on `install_root`'s `versions/` tree.
    pub fn new(
        install_root: PathBuf,
        service_manager: impl Into<String>,
        state: Arc<StateManager>,
        reporter: Arc<Reporter>,
    ) -> Self {
        Self {
            versions: VersionStore::new(install_root.join(crate::constants::VERSIONS_DIR_NAME)),
            services: ServiceController::new(service_manager),
            state,
            reporter,
            install_root,
        }
    }

    /// Runs the full install workflow for `version`, whose package archive
    /// lives at `package_path`.
    pub fn install(&self, package_path: &Path, version: &str) -> Result<(), InstallError> {
        self.state
            .update_status(Stage::Installing, 0, "Starting installation...", None);

        let snapshot_dir = self.versions.create_version_dir(version)?;

        match self.deploy(package_path, version, &snapshot_dir) {
            Ok(()) => {
                self.state.update_status(
                    Stage::Success,
                    100,
                    format!("Successfully installed version {version}"),
                    None,
                );
                self.reporter.report(
                    Stage::Success,
                    100,
                    &format!("Successfully installed version {version}"),
                    None,
                );
                Ok(())
            }
            Err(PreDeployResult::NoRollback(err)) => {
                let _ = fs::remove_dir_all(&snapshot_dir);
                self.fail(&err);
                Err(err)
            }
            Err(PreDeployResult::Rollback(err)) => {
                let _ = fs::remove_dir_all(&snapshot_dir);
                let rollback = self.rollback();
                let composite = InstallError::DeploymentFailed {
                    cause: err.to_string(),
                    rollback,
                };
                self.fail(&composite);
                Err(composite)
            }
        }
    }

    fn fail(&self, err: &InstallError) {
        self.state
            .update_status(Stage::Failed, 0, "Installation failed", Some(err.to_string()));
        self.reporter
            .report(Stage::Failed, 0, "Installation failed", Some(&err.to_string()));
    }

    fn deploy(
        &self,
        package_path: &Path,
        version: &str,
        snapshot_dir: &Path,
    ) -> Result<(), PreDeployResult> {
        let file = fs::File::open(package_path)
            .map_err(|e| PreDeployResult::NoRollback(InstallError::Io(e)))?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| PreDeployResult::NoRollback(InstallError::Archive(e.to_string())))?;

        let manifest_bytes = read_entry(&mut archive, "manifest.json")
            .map_err(|e| PreDeployResult::NoRollback(InstallError::Archive(e.to_string())))?;
        let manifest = Manifest::parse(&manifest_bytes)
            .map_err(|e| PreDeployResult::NoRollback(InstallError::Manifest(e)))?;
        manifest
            .require_version(version)
            .map_err(|e| PreDeployResult::NoRollback(InstallError::Manifest(e)))?;

        // Preserved alongside the deployed files so a later rollback can
        // recover this version's service list without the original package.
        fs::write(snapshot_dir.join("manifest.json"), &manifest_bytes)
            .map_err(|e| PreDeployResult::NoRollback(InstallError::Io(e)))?;

        let service_names = manifest.services();
        for name in &service_names {
            self.services
                .stop(name, SERVICE_STOP_TIMEOUT)
                .map_err(|e| PreDeployResult::NoRollback(InstallError::Service(e)))?;
        }

        let total = manifest.modules.len().max(1);
        for (index, module) in manifest.modules.iter().enumerate() {
            self.deploy_module(&mut archive, snapshot_dir, module)
                .map_err(PreDeployResult::Rollback)?;

            let progress = 5 + ((index + 1) * 80 / total) as u32;
            if progress % 10 == 0 || total <= 10 {
                let message = format!("Deployed module '{}'", module.name);
                self.state
                    .update_status(Stage::Installing, progress, message.clone(), None);
                self.reporter.report(Stage::Installing, progress, &message, None);
            }
        }

        self.state
            .update_status(Stage::Installing, 85, "Starting services...", None);
        self.reporter
            .report(Stage::Installing, 85, "Starting services...", None);
        for name in &service_names {
            if let Err(err) = self.services.start(name, SERVICE_START_TIMEOUT) {
                warn!(service = name, error = %err, "service failed to start after deploy, continuing");
            }
        }

        self.state
            .update_status(Stage::Installing, 95, "Verifying deployment...", None);
        self.reporter
            .report(Stage::Installing, 95, "Verifying deployment...", None);
        for module in &manifest.modules {
            let (rel, _) = relative_path(&module.dst, &self.install_root);
            let deployed = snapshot_dir.join(&rel);
            if !deployed.is_file() {
                return Err(PreDeployResult::Rollback(InstallError::VerificationFailed(
                    module.name.clone(),
                )));
            }
        }

        self.versions
            .promote_version(version)
            .map_err(|e| PreDeployResult::Rollback(InstallError::VersionStore(e)))?;

        info!(version, "installation promoted");
        Ok(())
    }

    fn deploy_module(
        &self,
        archive: &mut ZipArchive<fs::File>,
        snapshot_dir: &Path,
        module: &crate::manifest::Module,
    ) -> Result<(), InstallError> {
        let (rel, outside_root) = relative_path(&module.dst, &self.install_root);
        let final_path = snapshot_dir.join(&rel);
        let mut tmp_name = final_path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut entry = archive
            .by_name(&module.src)
            .map_err(|e| InstallError::Archive(format!("module '{}': {e}", module.name)))?;
        let mode = entry.unix_mode();

        {
            let mut out = fs::File::create(&tmp_path)?;
            std::io::copy(&mut entry, &mut out)?;
        }
        if let Some(mode) = mode {
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(mode))?;
        }
        fs::rename(&tmp_path, &final_path)?;

        if outside_root {
            let dst = PathBuf::from(&module.dst);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&final_path, &dst)?;
            if let Some(mode) = mode {
                fs::set_permissions(&dst, fs::Permissions::from_mode(mode))?;
            }
        }

        if let Some(commands) = &module.post_cmds {
            for command in commands {
                run_post_cmd(command, POST_CMD_TIMEOUT)?;
            }
        }

        Ok(())
    }

    /// Two-level rollback ladder: try `previous`, then `factory`.
    fn rollback(&self) -> RollbackOutcome {
        match self.rollback_to(Rollback::Previous) {
            Ok(version) => return RollbackOutcome::Level1Success(version),
            Err(level1) => {
                warn!(error = %level1, "level 1 rollback failed or unhealthy, trying factory");
                match self.rollback_to(Rollback::Factory) {
                    Ok(version) => return RollbackOutcome::Level2Success(version),
                    Err(level2) => {
                        return RollbackOutcome::BothFailed { level1, level2 };
                    }
                }
            }
        }
    }

    fn rollback_to(&self, target: Rollback) -> Result<String, String> {
        let version = match target {
            Rollback::Previous => self.versions.get_previous_version(),
            Rollback::Factory => self.versions.get_factory_version(),
        }
        .ok_or_else(|| match target {
            Rollback::Previous => "no previous version recorded".to_string(),
            Rollback::Factory => "no factory version recorded".to_string(),
        })?;

        let manifest_services = self.services_for_installed_version(&version);
        for name in &manifest_services {
            let _ = self.services.stop(name, SERVICE_STOP_TIMEOUT);
        }

        match target {
            Rollback::Previous => self.versions.rollback_to_previous(),
            Rollback::Factory => self.versions.rollback_to_factory(),
        }
        .map_err(|e| e.to_string())?;

        for name in &manifest_services {
            let _ = self.services.start(name, SERVICE_START_TIMEOUT);
        }

        let healthy = manifest_services
            .iter()
            .all(|name| self.services.status(name) == ServiceStatus::Active);
        if !healthy && !manifest_services.is_empty() {
            return Err(format!("services unhealthy after rollback to '{version}'"));
        }

        Ok(version)
    }

    /// Recovers the service list for a rolled-back version by re-reading the
    /// `manifest.json` that `deploy()` preserves in that version's snapshot
    /// directory. Older snapshots deployed before this was tracked fall back
    /// to an empty list.
    fn services_for_installed_version(&self, version: &str) -> Vec<String> {
        let manifest_path = self
            .install_root
            .join(crate::constants::VERSIONS_DIR_NAME)
            .join(format!("v{version}"))
            .join("manifest.json");
        let Ok(bytes) = fs::read(&manifest_path) else {
            return Vec::new();
        };
        Manifest::parse(&bytes).map(|m| m.services()).unwrap_or_default()
    }
}

enum Rollback {
    Previous,
    Factory,
}

enum PreDeployResult {
    NoRollback(InstallError),
    Rollback(InstallError),
}

fn read_entry(archive: &mut ZipArchive<fs::File>, name: &str) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .map_err(zip::result::ZipError::Io)?;
    Ok(buf)
}

/// Strips the install-root prefix from an absolute `dst`, returning the
/// snapshot-relative path and whether `dst` falls outside the install root.
fn relative_path(dst: &str, install_root: &Path) -> (PathBuf, bool) {
    let root = install_root.to_string_lossy().trim_end_matches('/').to_string();
    let prefix = format!("{root}/");
    if let Some(stripped) = dst.strip_prefix(&prefix) {
        (PathBuf::from(stripped), false)
    } else {
        (PathBuf::from(dst.trim_start_matches('/')), true)
    }
}

/// Runs `command` via `sh -c`, killing it if it exceeds `timeout`, and
/// capturing up to [`POST_CMD_OUTPUT_CAP`] bytes of combined stdout/stderr.
fn run_post_cmd(command: &str, timeout: Duration) -> Result<(), InstallError> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let stdout_reader = std::thread::spawn(move || drain_capped(&mut stdout));
    let stderr_reader = std::thread::spawn(move || drain_capped(&mut stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(POST_CMD_POLL_INTERVAL);
    };

    let captured_stdout = stdout_reader.join().unwrap_or_default();
    let captured_stderr = stderr_reader.join().unwrap_or_default();

    let Some(status) = status else {
        return Err(InstallError::PostCmdTimeout(command.to_string()));
    };

    if !status.success() {
        return Err(InstallError::PostCmdFailed {
            command: command.to_string(),
            exit: status.code(),
            stderr: format!("{captured_stdout}{captured_stderr}"),
        });
    }

    Ok(())
}

fn drain_capped(pipe: &mut Option<impl Read>) -> String {
    let Some(pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = pipe.read(&mut chunk) else { break };
        if n == 0 {
            break;
        }
        if buf.len() < POST_CMD_OUTPUT_CAP {
            let remaining = POST_CMD_OUTPUT_CAP - buf.len();
            buf.extend_from_slice(&chunk[..n.min(remaining)]);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
