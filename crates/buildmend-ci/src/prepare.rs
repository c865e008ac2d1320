//! Workspace preparation by external command.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use buildmend_core::{MendError, Result, WorkspacePreparer};
use tracing::info;

use crate::phase::PhaseCommand;
use crate::runner::execute;

/// Runs a command in the workspace before the session starts, e.g. to stop
/// a dev server that holds files open.
#[derive(Debug, Clone)]
pub struct CommandPreparer {
    config: PhaseCommand,
}

impl CommandPreparer {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self {
            config: PhaseCommand::custom("prepare", command, timeout),
        }
    }
}

#[async_trait]
impl WorkspacePreparer for CommandPreparer {
    async fn prepare(&self, root: &Path) -> Result<()> {
        info!(command = %self.config.display(), "preparing workspace");
        let execution = execute(&self.config, root)
            .await
            .map_err(|e| MendError::PrepareFailed(format!("{}: {e}", self.config.display())))?;

        if execution.passed() {
            return Ok(());
        }
        let detail = if execution.timed_out {
            "timed out".to_string()
        } else {
            format!("exited with {:?}: {}", execution.exit_code, execution.stderr.trim())
        };
        Err(MendError::PrepareFailed(format!("{} {detail}", self.config.display())))
    }
}
