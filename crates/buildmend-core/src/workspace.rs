//! Workspace containment and backup-before-overwrite.
//!
//! Every path an instruction names is resolved through [`WorkspaceGuard`]
//! before anything touches the filesystem. Resolution is lexical so files that
//! do not exist yet can be checked, followed by a canonical check of the
//! nearest existing ancestor so a symlink inside the tree cannot point a write
//! outside it.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::{MendError, Result};

/// Suffix appended to a file name to form its backup path.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Pre-overwrite snapshot of a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupRecord {
    pub original: PathBuf,
    pub backup: PathBuf,
}

/// `path` with [`BACKUP_SUFFIX`] appended to its file name.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Guards all filesystem writes under a single workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical root; every resolved path starts with it.
    root: PathBuf,
    /// Root as configured, used to rebase absolute paths reported against it.
    given_root: PathBuf,
}

impl WorkspaceGuard {
    /// Create a guard for an existing directory.
    ///
    /// Relative roots such as `.` or `../app` are taken from the current
    /// directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let given_root = normalize_lexically(&std::path::absolute(&root)?);
        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(MendError::InvalidConfig(format!(
                "workspace root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root, given_root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` against the root, failing if it escapes.
    ///
    /// Relative paths are joined onto the root. Absolute paths are accepted
    /// only when they already lie under it. The root itself is not a valid
    /// target.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let violation = || MendError::WorkspaceViolation {
            path: path.to_path_buf(),
            root: self.root.clone(),
        };

        let raw = path.as_os_str();
        if raw.is_empty() || path.to_string_lossy().contains('\0') {
            return Err(violation());
        }

        let joined = if path.is_absolute() {
            self.rebase(path)
        } else {
            self.root.join(path)
        };
        let normalized = normalize_lexically(&joined);

        if normalized == self.root || !normalized.starts_with(&self.root) {
            return Err(violation());
        }

        // Walk up to the nearest entry that exists without following a final
        // symlink, then make sure its real location is still inside the root.
        let mut ancestor = normalized.as_path();
        while std::fs::symlink_metadata(ancestor).is_err() {
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => return Err(violation()),
            }
        }
        let real = ancestor.canonicalize().map_err(|_| violation())?;
        if !real.starts_with(&self.root) {
            return Err(violation());
        }

        Ok(normalized)
    }

    /// Workspace-relative form of `path`, with `/` separators.
    pub fn relative_to_root(&self, path: &Path) -> Option<String> {
        let rebased = self.rebase(path);
        let relative = rebased.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Copy an existing file to its backup path.
    ///
    /// Returns `None` when there is nothing to back up (missing path or a
    /// directory) or when the copy fails; a failed copy is logged and never
    /// blocks the write that follows.
    pub fn backup(&self, path: &Path) -> Option<BackupRecord> {
        let metadata = std::fs::symlink_metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }

        let backup = backup_path(path);
        match std::fs::copy(path, &backup) {
            Ok(_) => {
                debug!(original = %path.display(), backup = %backup.display(), "backup created");
                Some(BackupRecord {
                    original: path.to_path_buf(),
                    backup,
                })
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "backup failed; continuing without it");
                None
            }
        }
    }

    /// Remove every backup file under the root. Returns how many were removed.
    pub fn cleanup_backups(&self) -> usize {
        let mut removed = 0;
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let is_backup = entry
                .file_name()
                .to_string_lossy()
                .ends_with(BACKUP_SUFFIX);
            if !is_backup {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "backup removed");
                    removed += 1;
                }
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to remove backup"),
            }
        }
        removed
    }

    /// Map an absolute path reported against the configured root onto the
    /// canonical root.
    fn rebase(&self, path: &Path) -> PathBuf {
        let normalized = normalize_lexically(path);
        if normalized.starts_with(&self.root) {
            return normalized;
        }
        match normalized.strip_prefix(&self.given_root) {
            Ok(rest) => self.root.join(rest),
            Err(_) => normalized,
        }
    }
}

/// Lexically normalize a path: drop `.`, let `..` pop its parent.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
