//! Snapshot directory layout and atomic symlink promotion (component C3).
//!
//! Reimplements `VersionManager.update_symlink`'s temp-symlink-then-rename
//! technique from the Python reference in terms of
//! `std::os::unix::fs::symlink` + `std::fs::rename`, which gives the same
//! atomicity guarantee POSIX `rename(2)` provides over a symlink.

use std::{
    fs, io,
    os::unix::fs::{symlink, PermissionsExt},
    path::{Path, PathBuf},
};

use crate::constants::{CURRENT_LINK, FACTORY_LINK, PREVIOUS_LINK};
use crate::error::VersionStoreError;

/// Owns the `<base>/versions` directory tree and its three managed symlinks.
pub struct VersionStore {
    base: PathBuf,
}

impl VersionStore {
    /// `base` is the versions directory itself (e.g. `<install_root>/versions`).
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn version_dir(&self, version: &str) -> PathBuf {
        self.base.join(format!("v{version}"))
    }

    fn link(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }

    /// Creates `<base>/v<version>`, failing if it already exists.
    pub fn create_version_dir(&self, version: &str) -> Result<PathBuf, VersionStoreError> {
        let dir = self.version_dir(version);
        if dir.exists() {
            return Err(VersionStoreError::AlreadyExists(version.to_string()));
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Atomically repoints `link_path` at `target` using a temp-symlink +
    /// rename. On failure the temp link is removed and the original symlink,
    /// if any, is left untouched.
    fn update_symlink(&self, link_path: &Path, target: &Path) -> Result<(), VersionStoreError> {
        if !target.exists() {
            return Err(VersionStoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("target does not exist: {}", target.display()),
            )));
        }

        let parent = link_path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = link_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("link");
        let temp_link = parent.join(format!(".{file_name}.tmp.{}", std::process::id()));

        let relative_target = pathdiff(target, parent);

        let result = symlink(&relative_target, &temp_link)
            .and_then(|_| fs::rename(&temp_link, link_path));

        if result.is_err() && temp_link.exists() {
            let _ = fs::remove_file(&temp_link);
        }

        result.map_err(VersionStoreError::Io)
    }

    /// `current` -> previous current, then `current` -> `v<version>`.
    pub fn promote_version(&self, version: &str) -> Result<(), VersionStoreError> {
        let version_dir = self.version_dir(version);
        if !version_dir.exists() {
            return Err(VersionStoreError::NotFound(version.to_string()));
        }

        let current_link = self.link(CURRENT_LINK);
        if let Ok(current_target) = fs::read_link(&current_link).map(|rel| {
            current_link
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(rel)
        }) && current_target.exists()
        {
            self.update_symlink(&self.link(PREVIOUS_LINK), &current_target)?;
        }

        self.update_symlink(&current_link, &version_dir)
    }

    /// One-time: sets `factory` and makes the snapshot recursively read-only.
    pub fn set_factory_version(&self, version: &str) -> Result<(), VersionStoreError> {
        let factory_link = self.link(FACTORY_LINK);
        if factory_link.exists() {
            let current = self.get_factory_version().unwrap_or_default();
            return Err(VersionStoreError::FactoryAlreadySet(current));
        }

        let version_dir = self.version_dir(version);
        if !version_dir.exists() {
            return Err(VersionStoreError::NotFound(version.to_string()));
        }

        self.update_symlink(&factory_link, &version_dir)?;
        set_readonly_recursive(&version_dir)?;
        Ok(())
    }

    fn resolve_link_version(&self, link_name: &str) -> Option<String> {
        let link = self.link(link_name);
        let target = fs::read_link(&link).ok()?;
        let resolved = if target.is_absolute() {
            target
        } else {
            link.parent().unwrap_or_else(|| Path::new(".")).join(target)
        };
        let name = resolved.file_name()?.to_str()?;
        Some(name.strip_prefix('v').unwrap_or(name).to_string())
    }

    /// Resolves `current` and strips the `v` prefix.
    pub fn get_current_version(&self) -> Option<String> {
        self.resolve_link_version(CURRENT_LINK)
    }

    /// Resolves `previous` and strips the `v` prefix.
    pub fn get_previous_version(&self) -> Option<String> {
        self.resolve_link_version(PREVIOUS_LINK)
    }

    /// Resolves `factory` and strips the `v` prefix.
    pub fn get_factory_version(&self) -> Option<String> {
        self.resolve_link_version(FACTORY_LINK)
    }

    /// Sorted list of installed version directories (symlinks excluded).
    pub fn list_versions(&self) -> Result<Vec<String>, VersionStoreError> {
        let mut versions = Vec::new();
        if !self.base.exists() {
            return Ok(versions);
        }
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_symlink() || !file_type.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                versions.push(name.strip_prefix('v').unwrap_or(name).to_string());
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Repoints `current` at `previous`.
    pub fn rollback_to_previous(&self) -> Result<String, VersionStoreError> {
        let version = self
            .get_previous_version()
            .ok_or(VersionStoreError::NoPrevious)?;
        let dir = self.version_dir(&version);
        if !dir.exists() {
            return Err(VersionStoreError::NotFound(version));
        }
        self.update_symlink(&self.link(CURRENT_LINK), &dir)?;
        Ok(version)
    }

    /// Repoints `current` at `factory`.
    pub fn rollback_to_factory(&self) -> Result<String, VersionStoreError> {
        let version = self
            .get_factory_version()
            .ok_or(VersionStoreError::NoFactory)?;
        let dir = self.version_dir(&version);
        if !dir.exists() {
            return Err(VersionStoreError::NotFound(version));
        }
        self.update_symlink(&self.link(CURRENT_LINK), &dir)?;
        Ok(version)
    }

    /// Removes `v<version>`, refusing if it is `current`, `previous`, or
    /// `factory`.
    pub fn delete_version(&self, version: &str) -> Result<(), VersionStoreError> {
        for protected in [
            self.get_current_version(),
            self.get_previous_version(),
            self.get_factory_version(),
        ]
        .into_iter()
        .flatten()
        {
            if protected == version {
                return Err(VersionStoreError::ProtectedVersion(version.to_string()));
            }
        }

        let dir = self.version_dir(version);
        if !dir.exists() {
            return Err(VersionStoreError::NotFound(version.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    /// True iff `factory` resolves to an existing, non-empty directory.
    pub fn verify_factory_version(&self) -> bool {
        let Some(version) = self.get_factory_version() else {
            return false;
        };
        let dir = self.version_dir(&version);
        let Ok(mut entries) = fs::read_dir(&dir) else {
            return false;
        };
        entries.next().is_some()
    }
}

fn set_readonly_recursive(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            set_readonly_recursive(&entry.path())?;
        }
        fs::set_permissions(path, fs::Permissions::from_mode(0o555))?;
    } else {
        fs::set_permissions(path, fs::Permissions::from_mode(0o444))?;
    }
    Ok(())
}

/// Computes `target`'s path relative to `from`, both assumed to share a
/// common ancestor (the versions base directory in practice).
fn pathdiff(target: &Path, from: &Path) -> PathBuf {
    let target_components: Vec<_> = target.components().collect();
    let from_components: Vec<_> = from.components().collect();

    let common = target_components
        .iter()
        .zip(from_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component);
    }
    result
}
