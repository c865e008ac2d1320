//! Build phase and attempt types.

use serde::{Deserialize, Serialize};

/// Message carried by an attempt that exceeded its wall-clock timeout.
pub const TIMEOUT_SENTINEL: &str = "operation timed out";

/// The two sequential build phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Compile,
    Package,
}

impl BuildPhase {
    pub fn name(&self) -> &'static str {
        match self {
            BuildPhase::Compile => "compile",
            BuildPhase::Package => "package",
        }
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one build tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildAttempt {
    pub phase: BuildPhase,

    pub success: bool,

    /// Exit code, when the process ran to completion.
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,

    /// Set when the phase was cut off by the timeout.
    #[serde(default)]
    pub timed_out: bool,
}

impl BuildAttempt {
    /// A successful attempt.
    pub fn passed(phase: BuildPhase, stdout: impl Into<String>) -> Self {
        Self {
            phase,
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            elapsed_ms: 0,
            timed_out: false,
        }
    }

    /// A failed attempt with the given output.
    pub fn failed(phase: BuildPhase, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            phase,
            success: false,
            exit_code: Some(1),
            stdout: stdout.into(),
            stderr: stderr.into(),
            elapsed_ms: 0,
            timed_out: false,
        }
    }

    /// A failed attempt that hit the timeout. Raw tool output is discarded.
    pub fn timed_out(phase: BuildPhase, elapsed_ms: u64) -> Self {
        Self {
            phase,
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: TIMEOUT_SENTINEL.to_string(),
            elapsed_ms,
            timed_out: true,
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// stdout and stderr joined by a newline.
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Both phases of one build invocation.
///
/// `package` is only present when `compile` succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildOutcome {
    pub compile: BuildAttempt,
    pub package: Option<BuildAttempt>,
}

impl BuildOutcome {
    pub fn new(compile: BuildAttempt, package: Option<BuildAttempt>) -> Self {
        Self { compile, package }
    }

    /// Both phases ran and passed.
    pub fn succeeded(&self) -> bool {
        self.compile.success && self.package.as_ref().is_some_and(|p| p.success)
    }

    /// The attempt that failed, if any.
    ///
    /// A passing compile with no package attempt is reported as the compile
    /// attempt so callers always have output to diagnose.
    pub fn failed_attempt(&self) -> Option<&BuildAttempt> {
        if self.succeeded() {
            return None;
        }
        match &self.package {
            Some(package) if self.compile.success => Some(package),
            _ => Some(&self.compile),
        }
    }

    /// The furthest phase that ran.
    pub fn last_phase(&self) -> BuildPhase {
        match &self.package {
            Some(package) => package.phase,
            None => self.compile.phase,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.compile.timed_out || self.package.as_ref().is_some_and(|p| p.timed_out)
    }

    /// Combined output of every phase that ran, in order.
    pub fn combined_log(&self) -> String {
        match &self.package {
            Some(package) => format!(
                "{}\n{}",
                self.compile.combined_output(),
                package.combined_output()
            ),
            None => self.compile.combined_output(),
        }
    }
}
