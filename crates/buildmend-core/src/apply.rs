//! Ordered, best-effort application of change instructions.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{ChangeAction, ChangeInstruction};
use crate::metrics::METRICS;
use crate::workspace::{BackupRecord, WorkspaceGuard};

/// One instruction that could not be applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyError {
    pub path: String,
    pub action: ChangeAction,
    pub reason: String,
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.action, self.path, self.reason)
    }
}

/// Outcome of applying one batch of instructions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyResult {
    /// Files written or removed. No-op instructions are not counted.
    pub touched: usize,

    pub errors: Vec<ApplyError>,

    pub backups: Vec<BackupRecord>,
}

impl ApplyResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Applies changesets to a workspace through a [`WorkspaceGuard`].
#[derive(Debug, Clone)]
pub struct ChangeApplier {
    guard: WorkspaceGuard,
}

impl ChangeApplier {
    pub fn new(guard: WorkspaceGuard) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &WorkspaceGuard {
        &self.guard
    }

    /// Apply `instructions` strictly in order.
    ///
    /// A failing instruction is recorded and skipped; the rest of the batch
    /// still runs. Later instructions win over earlier ones on the same path.
    pub fn apply(&self, instructions: &[ChangeInstruction]) -> ApplyResult {
        let mut result = ApplyResult::default();

        for instruction in instructions {
            match self.apply_one(instruction, &mut result.backups) {
                Ok(true) => {
                    result.touched += 1;
                    METRICS.inc_instructions_applied();
                    info!(path = %instruction.path, action = %instruction.action, "applied");
                }
                Ok(false) => {
                    info!(path = %instruction.path, action = %instruction.action, "unchanged");
                }
                Err(reason) => {
                    METRICS.inc_apply_errors();
                    warn!(
                        path = %instruction.path,
                        action = %instruction.action,
                        reason = %reason,
                        "instruction failed"
                    );
                    result.errors.push(ApplyError {
                        path: instruction.path.clone(),
                        action: instruction.action,
                        reason,
                    });
                }
            }
        }

        result
    }

    /// Returns whether the workspace changed.
    fn apply_one(
        &self,
        instruction: &ChangeInstruction,
        backups: &mut Vec<BackupRecord>,
    ) -> std::result::Result<bool, String> {
        let target = self
            .guard
            .resolve(&instruction.path)
            .map_err(|e| e.to_string())?;

        match instruction.action {
            ChangeAction::Delete => self.delete(&target, backups),
            ChangeAction::Create | ChangeAction::Update => {
                let content = instruction
                    .content
                    .as_deref()
                    .ok_or_else(|| "missing content".to_string())?;
                self.write(&target, content, backups)
            }
        }
    }

    fn delete(&self, target: &Path, backups: &mut Vec<BackupRecord>) -> std::result::Result<bool, String> {
        let Ok(metadata) = std::fs::symlink_metadata(target) else {
            return Ok(false);
        };

        if metadata.is_dir() {
            std::fs::remove_dir_all(target).map_err(|e| e.to_string())?;
        } else {
            backups.extend(self.guard.backup(target));
            std::fs::remove_file(target).map_err(|e| e.to_string())?;
        }
        Ok(true)
    }

    fn write(
        &self,
        target: &Path,
        content: &str,
        backups: &mut Vec<BackupRecord>,
    ) -> std::result::Result<bool, String> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        if target.is_dir() {
            return Err("target is a directory".to_string());
        }

        if target.exists() {
            if std::fs::read(target).is_ok_and(|existing| existing == content.as_bytes()) {
                return Ok(false);
            }
            backups.extend(self.guard.backup(target));
        }

        std::fs::write(target, content).map_err(|e| e.to_string())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn applier(dir: &Path) -> ChangeApplier {
        ChangeApplier::new(WorkspaceGuard::new(dir).expect("guard"))
    }

    #[test]
    fn test_create_makes_parent_directories() {
        let dir = tempdir().expect("tempdir");
        let applier = applier(dir.path());
        let result = applier.apply(&[ChangeInstruction::create("src/main/java/App.java", "class App {}")]);

        assert!(result.is_clean());
        assert_eq!(result.touched, 1);
        let written = std::fs::read_to_string(dir.path().join("src/main/java/App.java")).expect("read");
        assert_eq!(written, "class App {}");
    }

    #[test]
    fn test_update_backs_up_previous_content() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("pom.xml"), "<old/>").expect("write");
        let applier = applier(dir.path());

        let result = applier.apply(&[ChangeInstruction::update("pom.xml", "<new/>")]);
        assert_eq!(result.backups.len(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("pom.xml.bak")).expect("bak"), "<old/>");
        assert_eq!(std::fs::read_to_string(dir.path().join("pom.xml")).expect("new"), "<new/>");
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let dir = tempdir().expect("tempdir");
        let result = applier(dir.path()).apply(&[ChangeInstruction::delete("ghost.txt")]);
        assert!(result.is_clean());
        assert_eq!(result.touched, 0);
    }

    #[test]
    fn test_delete_directory_recursively() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("legacy/dao")).expect("mkdir");
        std::fs::write(dir.path().join("legacy/dao/Old.java"), "x").expect("write");

        let result = applier(dir.path()).apply(&[ChangeInstruction::delete("legacy")]);
        assert!(result.is_clean());
        assert!(!dir.path().join("legacy").exists());
    }

    #[test]
    fn test_last_write_wins() {
        let dir = tempdir().expect("tempdir");
        let result = applier(dir.path()).apply(&[
            ChangeInstruction::create("a.txt", "first"),
            ChangeInstruction::update("a.txt", "second"),
        ]);
        assert_eq!(result.touched, 2);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).expect("read"), "second");
    }

    #[test]
    fn test_traversal_fails_only_that_instruction() {
        let dir = tempdir().expect("tempdir");
        let result = applier(dir.path()).apply(&[
            ChangeInstruction::create("../escape.txt", "nope"),
            ChangeInstruction::create("ok.txt", "yes"),
        ]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "../escape.txt");
        assert_eq!(result.touched, 1);
        assert!(dir.path().join("ok.txt").exists());
    }

    #[test]
    fn test_missing_content_is_per_file_error() {
        let dir = tempdir().expect("tempdir");
        let instruction = ChangeInstruction {
            path: "a.txt".to_string(),
            action: ChangeAction::Create,
            content: None,
        };
        let result = applier(dir.path()).apply(&[instruction]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].reason, "missing content");
    }

    #[test]
    fn test_identical_update_is_noop() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "same").expect("write");
        let result = applier(dir.path()).apply(&[ChangeInstruction::update("a.txt", "same")]);
        assert_eq!(result.touched, 0);
        assert!(result.backups.is_empty());
        assert!(!dir.path().join("a.txt.bak").exists());
    }
}
