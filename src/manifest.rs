//! Package manifest schema and validation.
//!
//! Grounded on the Python reference's `ManifestModule`/`Manifest` pydantic
//! models: same field set, same `..`-traversal rejection, re-expressed as
//! `serde` types with validation performed once at parse time rather than
//! per-field validators.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// A single software component to deploy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Module {
    /// Module identifier (e.g. `"device-api"`).
    pub name: String,
    /// Relative path inside the package archive (no leading `/`, no `..`).
    pub src: String,
    /// Absolute target path on the device. Accepts `dest` as a compatibility
    /// alias for an older manifest producer; always serialized as `dst`.
    #[serde(alias = "dest")]
    pub dst: String,
    /// Process/service name to stop before deployment and start after.
    #[serde(default)]
    pub process_name: Option<String>,
    /// Informational restart ordering hint; the OS service manager decides
    /// actual ordering.
    #[serde(default)]
    pub restart_order: Option<i64>,
    /// Shell commands run, in order, after this module's files are placed.
    #[serde(default)]
    pub post_cmds: Option<Vec<String>>,
}

/// Root `manifest.json` schema embedded in every package.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Semantic version of the package (`\d+.\d+.\d+`).
    pub version: String,
    /// Modules to deploy; must be non-empty with unique names.
    pub modules: Vec<Module>,
}

fn is_semver(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

impl Manifest {
    /// Parses and validates a manifest from JSON bytes, enforcing the same
    /// shape and traversal checks as the package-side producer.
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| ManifestError::Invalid(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if !is_semver(&self.version) {
            return Err(ManifestError::Invalid(format!(
                "version '{}' is not a valid semantic version",
                self.version
            )));
        }
        if self.modules.is_empty() {
            return Err(ManifestError::Invalid("modules list is empty".into()));
        }

        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.name.as_str()) {
                return Err(ManifestError::Invalid(format!(
                    "duplicate module name '{}'",
                    module.name
                )));
            }
            if module.src.starts_with('/') || module.src.contains("..") {
                return Err(ManifestError::Invalid(format!(
                    "module '{}': src must be a relative path without '..'",
                    module.name
                )));
            }
            if !module.dst.starts_with('/') || module.dst.contains("..") {
                return Err(ManifestError::Invalid(format!(
                    "module '{}': dst must be an absolute path without '..'",
                    module.name
                )));
            }
        }

        Ok(())
    }

    /// Ensures this manifest is for the version the installer was asked to
    /// install.
    pub fn require_version(&self, expected: &str) -> Result<(), ManifestError> {
        if self.version != expected {
            return Err(ManifestError::VersionMismatch {
                manifest: self.version.clone(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }

    /// Deduplicated, order-preserving list of `process_name`s referenced by
    /// any module.
    pub fn services(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for module in &self.modules {
            if let Some(name) = &module.process_name
                && seen.insert(name.clone())
            {
                out.push(name.clone());
            }
        }
        out
    }
}
