//! Process-backed build execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use buildmend_core::{BuildAttempt, BuildOutcome, BuildPhase, BuildRunner, BuildToolConfig, MendError, Result};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::phase::PhaseCommand;

/// Wall-clock bound on the availability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Raw result of running one command.
#[derive(Debug, Clone)]
pub struct Execution {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub timed_out: bool,
}

impl Execution {
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `config` in `cwd`, capturing output.
///
/// Returns `Err` only when the process could not be started. On timeout the
/// child is killed and the execution is marked `timed_out`.
pub async fn execute(config: &PhaseCommand, cwd: &Path) -> std::io::Result<Execution> {
    let start = Instant::now();

    let Some((exe, args)) = config.command.split_first() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("command {} is empty", config.name),
        ));
    };

    let child = Command::new(exe)
        .args(args)
        .envs(&config.env)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let waited = tokio::time::timeout(config.timeout(), child.wait_with_output()).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let Ok(output) = waited else {
        warn!(command = %config.name, timeout_ms = config.timeout_ms, "command timed out");
        return Ok(Execution {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms,
            timed_out: true,
        });
    };
    let output = output?;

    Ok(Execution {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms,
        timed_out: false,
    })
}

/// [`BuildRunner`] that shells out to the configured build tool.
#[derive(Debug, Clone)]
pub struct ToolBuildRunner {
    tool: BuildToolConfig,
    probe_timeout: Duration,
}

impl ToolBuildRunner {
    pub fn new(tool: BuildToolConfig) -> Self {
        Self {
            tool,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn tool(&self) -> &BuildToolConfig {
        &self.tool
    }

    /// Run one phase and turn whatever happened into a [`BuildAttempt`].
    pub async fn run_phase(&self, phase: BuildPhase, root: &Path, timeout: Duration) -> BuildAttempt {
        let config = PhaseCommand::for_phase(&self.tool, phase, timeout);
        info!(phase = %phase, command = %config.display(), "running build phase");

        match execute(&config, root).await {
            Ok(execution) if execution.timed_out => BuildAttempt::timed_out(phase, execution.duration_ms),
            Ok(execution) => {
                debug!(phase = %phase, exit_code = ?execution.exit_code, "build phase exited");
                BuildAttempt {
                    phase,
                    success: execution.passed(),
                    exit_code: execution.exit_code,
                    stdout: execution.stdout,
                    stderr: execution.stderr,
                    elapsed_ms: execution.duration_ms,
                    timed_out: false,
                }
            }
            Err(e) => {
                warn!(phase = %phase, error = %e, "build tool could not be started");
                BuildAttempt {
                    phase,
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to start {}: {e}", config.display()),
                    elapsed_ms: 0,
                    timed_out: false,
                }
            }
        }
    }
}

#[async_trait]
impl BuildRunner for ToolBuildRunner {
    async fn check_available(&self) -> Result<()> {
        let probe = PhaseCommand::probe(&self.tool, self.probe_timeout);
        let cwd = std::env::current_dir()?;
        let execution = execute(&probe, &cwd)
            .await
            .map_err(|e| MendError::BuildToolUnavailable(format!("{}: {e}", self.tool.program)))?;

        if execution.passed() {
            debug!(program = %self.tool.program, "build tool available");
            return Ok(());
        }

        let reason = if execution.timed_out {
            format!("{} timed out", probe.display())
        } else {
            format!("{} exited with {:?}", probe.display(), execution.exit_code)
        };
        Err(MendError::BuildToolUnavailable(reason))
    }

    async fn run(&self, root: &Path, timeout: Duration) -> BuildOutcome {
        let compile = self.run_phase(BuildPhase::Compile, root, timeout).await;
        if !compile.success {
            return BuildOutcome::new(compile, None);
        }
        let package = self.run_phase(BuildPhase::Package, root, timeout).await;
        BuildOutcome::new(compile, Some(package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_passed() {
        let ok = Execution {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 5,
            timed_out: false,
        };
        assert!(ok.passed());

        let killed = Execution {
            exit_code: None,
            timed_out: true,
            ..ok.clone()
        };
        assert!(!killed.passed());

        let failed = Execution {
            exit_code: Some(1),
            ..ok
        };
        assert!(!failed.passed());
    }

    #[tokio::test]
    async fn test_empty_command_is_error() {
        let config = PhaseCommand::custom("empty", vec![], Duration::from_secs(5));
        let cwd = std::env::temp_dir();
        assert!(execute(&config, &cwd).await.is_err());
    }
}
