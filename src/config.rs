//! Configuration loading for the updater.
//!
//! A YAML file (default `./topeupdate.yaml`) supplies defaults; any field may
//! be overridden by an environment variable prefixed `TOPEUPDATE_`, following
//! the override style the daemon this engine descends from uses for its own
//! `.env` merging, but applied to a flat struct instead of per-service maps.

use std::{env, fs, path::Path};

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration for the `topeupdated` process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory under which `tmp/`, `logs/`, and `versions/` live.
    pub install_root: String,
    /// Base URL of the orchestrator that receives progress reports.
    pub orchestrator_url: String,
    /// Port the HTTP ingress binds to.
    pub ingress_port: u16,
    /// Name of the service manager binary invoked for service control
    /// (normally `systemctl`; overridable so tests can substitute a stub).
    pub service_manager: String,
    /// Logging verbosity (`off`, `error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_root: crate::constants::DEFAULT_INSTALL_ROOT.to_string(),
            orchestrator_url: "http://localhost:9080".to_string(),
            ingress_port: crate::constants::INGRESS_PORT,
            service_manager: "systemctl".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Applies `TOPEUPDATE_*` environment overrides on top of whatever was
    /// loaded from the YAML file (or the struct default).
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("TOPEUPDATE_INSTALL_ROOT") {
            self.install_root = v;
        }
        if let Ok(v) = env::var("TOPEUPDATE_ORCHESTRATOR_URL") {
            self.orchestrator_url = v;
        }
        if let Ok(v) = env::var("TOPEUPDATE_INGRESS_PORT")
            && let Ok(port) = v.parse()
        {
            self.ingress_port = port;
        }
        if let Ok(v) = env::var("TOPEUPDATE_SERVICE_MANAGER") {
            self.service_manager = v;
        }
        if let Ok(v) = env::var("TOPEUPDATE_LOG_LEVEL") {
            self.log_level = v;
        }
        self
    }
}

/// Loads configuration from `path` if it exists, otherwise falls back to
/// built-in defaults; environment overrides are applied either way.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("topeupdate.yaml");

    let config = if Path::new(path).exists() {
        let content = fs::read_to_string(path).map_err(ConfigError::Read)?;
        serde_yaml::from_str(&content).map_err(ConfigError::Parse)?
    } else {
        Config::default()
    };

    Ok(config.apply_env_overrides())
}
