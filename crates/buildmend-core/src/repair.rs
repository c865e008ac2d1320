//! Inner repair loop.
//!
//! [`RepairController`] builds the workspace, and on failure extracts
//! diagnostics, asks the oracle for a fix, applies it and builds again, until
//! the build passes or the attempt bound is reached. Attempts count build
//! invocations: with a bound of `n` the runner is called at most `n` times.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::apply::{ApplyError, ChangeApplier};
use crate::config::RepairConfig;
use crate::diagnostics::{collect_relevant_files, extract_with_config, DiagnosticsConfig};
use crate::domain::{BuildOutcome, BuildPhase, Diagnostic};
use crate::metrics::METRICS;
use crate::obs::{emit_attempt_failed, emit_build_finished, emit_repair_exhausted};
use crate::oracle::{propose_with_retry, ChangeProposalOracle, OraclePolicy, ProposalRequest};
use crate::runner::BuildRunner;

/// States of the repair loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    Building(BuildPhase),
    Diagnosing,
    Proposing,
    Applying,
    Success,
    Exhausted,
}

impl RepairState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RepairState::Success | RepairState::Exhausted)
    }
}

impl std::fmt::Display for RepairState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairState::Building(phase) => write!(f, "building({phase})"),
            RepairState::Diagnosing => f.write_str("diagnosing"),
            RepairState::Proposing => f.write_str("proposing"),
            RepairState::Applying => f.write_str("applying"),
            RepairState::Success => f.write_str("success"),
            RepairState::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// What happened after one failed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub failed_phase: BuildPhase,
    pub timed_out: bool,
    pub diagnostics: Vec<Diagnostic>,

    /// Set when the oracle could not produce a usable changeset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle_error: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_errors: Vec<ApplyError>,
}

/// State of one inner run. Reset for every regeneration attempt.
#[derive(Debug, Clone)]
pub struct RepairSession {
    pub root: PathBuf,
    pub attempts: u32,
    pub bound: u32,
    pub log: Vec<AttemptRecord>,
}

impl RepairSession {
    pub fn new(root: PathBuf, bound: u32) -> Self {
        Self {
            root,
            attempts: 0,
            bound,
            log: Vec::new(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.bound
    }
}

/// Terminal result of the inner loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Both phases passed on build number `attempts`.
    Success {
        attempts: u32,
        log: String,
        history: Vec<AttemptRecord>,
    },

    /// The bound was reached. `log` is the last build's output verbatim.
    Exhausted {
        attempts: u32,
        log: String,
        history: Vec<AttemptRecord>,
        apply_errors: Vec<ApplyError>,
    },
}

impl RepairOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RepairOutcome::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RepairOutcome::Success { attempts, .. } | RepairOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn log(&self) -> &str {
        match self {
            RepairOutcome::Success { log, .. } | RepairOutcome::Exhausted { log, .. } => log,
        }
    }
}

/// Tunables for the inner loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairSettings {
    pub max_attempts: u32,
    pub build_timeout: Duration,
    pub oracle: OraclePolicy,
    pub diagnostics: DiagnosticsConfig,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self::from_config(&RepairConfig::default())
    }
}

impl RepairSettings {
    pub fn from_config(config: &RepairConfig) -> Self {
        Self {
            max_attempts: config.max_repair_attempts,
            build_timeout: config.build_timeout(),
            oracle: config.oracle_policy(),
            diagnostics: config.diagnostics_config(),
        }
    }
}

/// Drives build, diagnose, propose and apply until success or exhaustion.
pub struct RepairController<'a> {
    runner: &'a dyn BuildRunner,
    oracle: &'a dyn ChangeProposalOracle,
    applier: &'a ChangeApplier,
    settings: RepairSettings,
}

impl<'a> RepairController<'a> {
    pub fn new(
        runner: &'a dyn BuildRunner,
        oracle: &'a dyn ChangeProposalOracle,
        applier: &'a ChangeApplier,
        settings: RepairSettings,
    ) -> Self {
        Self {
            runner,
            oracle,
            applier,
            settings,
        }
    }

    pub async fn run(&self) -> RepairOutcome {
        let guard = self.applier.guard();
        let mut session = RepairSession::new(guard.root().to_path_buf(), self.settings.max_attempts);
        let mut apply_errors: Vec<ApplyError> = Vec::new();
        let mut state = RepairState::Building(BuildPhase::Compile);

        loop {
            session.attempts += 1;
            let attempt = session.attempts;
            debug!(attempt, state = %state, "building workspace");

            let outcome = self.runner.run(&session.root, self.settings.build_timeout).await;
            record_build(attempt, &outcome);
            if outcome.last_phase() == BuildPhase::Package {
                transition(&mut state, RepairState::Building(BuildPhase::Package), attempt);
            }

            if outcome.succeeded() {
                transition(&mut state, RepairState::Success, attempt);
                return RepairOutcome::Success {
                    attempts: attempt,
                    log: outcome.combined_log(),
                    history: session.log,
                };
            }

            transition(&mut state, RepairState::Diagnosing, attempt);
            let failed = outcome.failed_attempt().unwrap_or(&outcome.compile);
            let diagnostics = extract_with_config(&failed.combined_output(), &self.settings.diagnostics);
            emit_attempt_failed(attempt, failed.phase, diagnostics.len());

            let mut record = AttemptRecord {
                attempt,
                failed_phase: failed.phase,
                timed_out: failed.timed_out,
                diagnostics,
                oracle_error: None,
                apply_errors: Vec::new(),
            };

            if session.is_exhausted() {
                session.log.push(record);
                transition(&mut state, RepairState::Exhausted, attempt);
                emit_repair_exhausted(attempt);
                return RepairOutcome::Exhausted {
                    attempts: attempt,
                    log: outcome.combined_log(),
                    history: session.log,
                    apply_errors,
                };
            }

            if record.diagnostics.is_empty() {
                debug!(attempt, "no diagnostics extracted, rebuilding without a proposal");
                session.log.push(record);
                transition(&mut state, RepairState::Building(BuildPhase::Compile), attempt);
                continue;
            }

            transition(&mut state, RepairState::Proposing, attempt);
            let files = collect_relevant_files(&record.diagnostics, guard);
            let request = ProposalRequest::new(record.diagnostics.clone(), files);
            let instructions =
                match propose_with_retry(self.oracle, &request, &self.settings.oracle, attempt).await {
                    Ok(instructions) => instructions,
                    Err(e) => {
                        record.oracle_error = Some(e.to_string());
                        session.log.push(record);
                        transition(&mut state, RepairState::Building(BuildPhase::Compile), attempt);
                        continue;
                    }
                };

            transition(&mut state, RepairState::Applying, attempt);
            let result = self.applier.apply(&instructions);
            if !result.is_clean() {
                warn!(
                    attempt,
                    errors = result.errors.len(),
                    touched = result.touched,
                    "proposal applied with errors, rebuilding anyway"
                );
            }
            apply_errors.extend(result.errors.iter().cloned());
            record.apply_errors = result.errors;
            session.log.push(record);
            transition(&mut state, RepairState::Building(BuildPhase::Compile), attempt);
        }
    }
}

fn transition(state: &mut RepairState, next: RepairState, attempt: u32) {
    debug!(attempt, from = %state, to = %next, "repair state transition");
    *state = next;
}

fn record_build(attempt: u32, outcome: &BuildOutcome) {
    METRICS.inc_builds();
    if outcome.timed_out() {
        METRICS.inc_build_timeouts();
    }
    for phase in std::iter::once(&outcome.compile).chain(outcome.package.as_ref()) {
        emit_build_finished(attempt, phase.phase, phase.success, phase.elapsed_ms, phase.timed_out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildAttempt, DiagnosticKind, MendError};
    use crate::fakes::{ScriptedBuildRunner, ScriptedOracle};
    use crate::workspace::WorkspaceGuard;
    use tempfile::tempdir;

    const COMPILE_ERROR: &str = "[ERROR] src/A.java:[1,9] ';' expected";

    fn failing_compile(output: &str) -> BuildOutcome {
        BuildOutcome::new(BuildAttempt::failed(BuildPhase::Compile, output, ""), None)
    }

    fn failing_package(output: &str) -> BuildOutcome {
        BuildOutcome::new(
            BuildAttempt::passed(BuildPhase::Compile, "[INFO] compiled"),
            Some(BuildAttempt::failed(BuildPhase::Package, output, "")),
        )
    }

    fn passing() -> BuildOutcome {
        BuildOutcome::new(
            BuildAttempt::passed(BuildPhase::Compile, "[INFO] compiled"),
            Some(BuildAttempt::passed(BuildPhase::Package, "[INFO] BUILD SUCCESS")),
        )
    }

    fn fix() -> Result<String, MendError> {
        Ok(r#"[{"path": "src/A.java", "action": "update", "content": "class A { int x; }"}]"#.to_string())
    }

    fn settings(max_attempts: u32) -> RepairSettings {
        RepairSettings {
            max_attempts,
            ..RepairSettings::default()
        }
    }

    fn applier(dir: &std::path::Path) -> ChangeApplier {
        std::fs::create_dir_all(dir.join("src")).expect("mkdir");
        std::fs::write(dir.join("src/A.java"), "class A { int x }").expect("write");
        ChangeApplier::new(WorkspaceGuard::new(dir).expect("guard"))
    }

    #[tokio::test]
    async fn test_success_on_first_build() {
        let dir = tempdir().expect("tempdir");
        let applier = applier(dir.path());
        let runner = ScriptedBuildRunner::new(vec![passing()]);
        let oracle = ScriptedOracle::new(vec![]);

        let outcome = RepairController::new(&runner, &oracle, &applier, settings(5)).run().await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_bound_limits_build_invocations() {
        let dir = tempdir().expect("tempdir");
        let applier = applier(dir.path());
        let runner = ScriptedBuildRunner::new(vec![failing_compile(COMPILE_ERROR)]);
        let oracle = ScriptedOracle::new(vec![fix(), fix(), fix(), fix(), fix()]);

        let outcome = RepairController::new(&runner, &oracle, &applier, settings(3)).run().await;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(runner.runs(), 3);
        // No proposal is requested after the final failed build.
        assert_eq!(oracle.calls(), 2);
        assert!(outcome.log().contains("';' expected"));
    }

    #[tokio::test]
    async fn test_blind_rebuild_skips_oracle() {
        let dir = tempdir().expect("tempdir");
        let applier = applier(dir.path());
        let runner = ScriptedBuildRunner::new(vec![failing_compile("something odd happened"), passing()]);
        let oracle = ScriptedOracle::new(vec![]);

        let outcome = RepairController::new(&runner, &oracle, &applier, settings(5)).run().await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_fix_applied_between_builds() {
        let dir = tempdir().expect("tempdir");
        let applier = applier(dir.path());
        let runner = ScriptedBuildRunner::new(vec![failing_compile(COMPILE_ERROR), passing()]);
        let oracle = ScriptedOracle::new(vec![fix()]);

        let outcome = RepairController::new(&runner, &oracle, &applier, settings(5)).run().await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts(), 2);
        let content = std::fs::read_to_string(dir.path().join("src/A.java")).expect("read");
        assert_eq!(content, "class A { int x; }");

        let requests = oracle.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].diagnostics[0].kind, DiagnosticKind::Compilation);
        assert_eq!(
            requests[0].files.get("src/A.java").map(String::as_str),
            Some("class A { int x }")
        );
    }

    #[tokio::test]
    async fn test_package_failure_is_diagnosed() {
        let dir = tempdir().expect("tempdir");
        let applier = applier(dir.path());
        let runner = ScriptedBuildRunner::new(vec![
            failing_package("[ERROR] junit-4.13.jar was not found"),
            passing(),
        ]);
        let oracle = ScriptedOracle::new(vec![Ok(
            r#"[{"path": "pom.xml", "action": "create", "content": "<project/>"}]"#.to_string(),
        )]);

        let outcome = RepairController::new(&runner, &oracle, &applier, settings(5)).run().await;

        let RepairOutcome::Success { attempts, history, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(attempts, 2);
        assert_eq!(history[0].failed_phase, BuildPhase::Package);
        assert_eq!(history[0].diagnostics[0].kind, DiagnosticKind::Dependency);
        assert!(dir.path().join("pom.xml").exists());
    }

    #[tokio::test]
    async fn test_apply_errors_do_not_stop_rebuild() {
        let dir = tempdir().expect("tempdir");
        let applier = applier(dir.path());
        let runner = ScriptedBuildRunner::new(vec![failing_compile(COMPILE_ERROR)]);
        let oracle = ScriptedOracle::new(vec![Ok(
            r#"[{"path": "../escape.java", "action": "create", "content": "x"}]"#.to_string(),
        )]);

        let outcome = RepairController::new(&runner, &oracle, &applier, settings(2)).run().await;

        assert_eq!(runner.runs(), 2);
        let RepairOutcome::Exhausted { apply_errors, history, .. } = outcome else {
            panic!("expected exhaustion");
        };
        assert_eq!(apply_errors.len(), 1);
        assert_eq!(apply_errors[0].path, "../escape.java");
        assert_eq!(history[0].apply_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_oracle_exhaustion_consumes_the_attempt() {
        let dir = tempdir().expect("tempdir");
        let applier = applier(dir.path());
        let runner = ScriptedBuildRunner::new(vec![failing_compile(COMPILE_ERROR), passing()]);
        let oracle = ScriptedOracle::new(vec![Ok("not json".to_string()), Ok("still not json".to_string())]);

        let outcome = RepairController::new(&runner, &oracle, &applier, settings(5)).run().await;

        let RepairOutcome::Success { attempts, history, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(attempts, 2);
        assert_eq!(oracle.calls(), 2);
        assert!(history[0].oracle_error.is_some());
    }

    #[tokio::test]
    async fn test_build_timeout_consumes_an_attempt() {
        let dir = tempdir().expect("tempdir");
        let applier = applier(dir.path());
        let timed_out = BuildOutcome::new(BuildAttempt::timed_out(BuildPhase::Compile, 300_000), None);
        let runner = ScriptedBuildRunner::new(vec![timed_out, passing()]);
        let oracle = ScriptedOracle::new(vec![]);

        let outcome = RepairController::new(&runner, &oracle, &applier, settings(5)).run().await;

        let RepairOutcome::Success { attempts, history, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(attempts, 2);
        assert_eq!(history.len(), 1);
        assert!(history[0].timed_out);
        assert!(history[0].diagnostics.is_empty());
        // The timeout sentinel alone yields no diagnostics, so the retry is blind.
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RepairState::Building(BuildPhase::Package).to_string(), "building(package)");
        assert!(RepairState::Exhausted.is_terminal());
        assert!(!RepairState::Proposing.is_terminal());
    }
}
