//! Outer regeneration loop.
//!
//! When an inner repair run is exhausted, [`RegenerationController`] throws
//! the changeset away, asks the upstream [`ChangesetSource`] for a new one,
//! applies it and starts a fresh inner run, up to its own bound.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::apply::ChangeApplier;
use crate::config::RepairConfig;
use crate::domain::{parse_changeset, Result};
use crate::metrics::METRICS;
use crate::obs::{emit_session_finished, emit_session_started, SessionSpan};
use crate::oracle::ChangeProposalOracle;
use crate::repair::{RepairController, RepairOutcome, RepairSettings};
use crate::report::{write_report_artifact, RepairReport};
use crate::runner::BuildRunner;
use crate::workspace::WorkspaceGuard;

/// Upstream producer of whole changesets.
#[async_trait]
pub trait ChangesetSource: Send + Sync {
    /// Raw changeset text for outer attempt `attempt` (1-based).
    async fn next_changeset(&self, attempt: u32) -> Result<String>;
}

/// Frees the workspace before a session, e.g. by stopping a dev server.
#[async_trait]
pub trait WorkspacePreparer: Send + Sync {
    async fn prepare(&self, root: &Path) -> Result<()>;
}

/// Preparer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreparer;

#[async_trait]
impl WorkspacePreparer for NoopPreparer {
    async fn prepare(&self, _root: &Path) -> Result<()> {
        Ok(())
    }
}

/// Reads a changeset from a file, again on every attempt.
#[derive(Debug, Clone)]
pub struct FileChangesetSource {
    path: PathBuf,
}

impl FileChangesetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ChangesetSource for FileChangesetSource {
    async fn next_changeset(&self, _attempt: u32) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}

/// Runs a whole session: prepare, probe, then changeset and repair rounds.
pub struct RegenerationController {
    runner: Arc<dyn BuildRunner>,
    oracle: Arc<dyn ChangeProposalOracle>,
    source: Arc<dyn ChangesetSource>,
    preparer: Arc<dyn WorkspacePreparer>,
    applier: ChangeApplier,
    settings: RepairSettings,
    max_regenerations: u32,
    cleanup_backups_on_success: bool,
    report_dir: Option<PathBuf>,
}

impl RegenerationController {
    pub fn new(
        guard: WorkspaceGuard,
        runner: Arc<dyn BuildRunner>,
        oracle: Arc<dyn ChangeProposalOracle>,
        source: Arc<dyn ChangesetSource>,
        config: &RepairConfig,
    ) -> Self {
        Self {
            runner,
            oracle,
            source,
            preparer: Arc::new(NoopPreparer),
            applier: ChangeApplier::new(guard),
            settings: RepairSettings::from_config(config),
            max_regenerations: config.max_regeneration_attempts,
            cleanup_backups_on_success: config.cleanup_backups_on_success,
            report_dir: config.report_dir.clone(),
        }
    }

    pub fn with_preparer(mut self, preparer: Arc<dyn WorkspacePreparer>) -> Self {
        self.preparer = preparer;
        self
    }

    /// Run the session to completion.
    ///
    /// Returns `Err` only for fatal conditions: the workspace could not be
    /// prepared or the build tool is unavailable. Repair failure is reported
    /// through [`RepairReport::success`].
    pub async fn run(&self) -> Result<RepairReport> {
        let mut report = RepairReport::start();
        let _span = SessionSpan::enter(&report.session_id);
        let root = self.applier.guard().root().to_path_buf();
        emit_session_started(
            &report.session_id,
            &root.display().to_string(),
            self.settings.max_attempts,
            self.max_regenerations,
        );

        if let Err(e) = self.startup_checks(&root).await {
            error!(error = %e, "session aborted");
            METRICS.flush();
            return Err(e);
        }

        for outer in 1..=self.max_regenerations {
            report.outer_attempts = outer;

            let instructions = match self.source.next_changeset(outer).await.and_then(|raw| parse_changeset(&raw)) {
                Ok(instructions) => instructions,
                Err(e) => {
                    warn!(outer, error = %e, "no usable changeset, moving to next attempt");
                    report.changeset_errors.push(format!("attempt {outer}: {e}"));
                    continue;
                }
            };

            info!(outer, instructions = instructions.len(), "applying changeset");
            let applied = self.applier.apply(&instructions);

            let controller = RepairController::new(
                self.runner.as_ref(),
                self.oracle.as_ref(),
                &self.applier,
                self.settings.clone(),
            );
            match controller.run().await {
                RepairOutcome::Success { attempts, log, history } => {
                    report.success = true;
                    report.inner_attempts = attempts;
                    report.combined_log = log;
                    report.history = history;
                    report.apply_errors.clear();
                    if self.cleanup_backups_on_success {
                        let removed = self.applier.guard().cleanup_backups();
                        info!(removed, "removed backup files");
                    }
                    break;
                }
                RepairOutcome::Exhausted {
                    attempts,
                    log,
                    history,
                    apply_errors,
                } => {
                    warn!(outer, attempts, "repair exhausted, regenerating");
                    report.inner_attempts = attempts;
                    report.combined_log = log;
                    report.history = history;
                    report.apply_errors = applied.errors;
                    report.apply_errors.extend(apply_errors);
                }
            }
        }

        Ok(self.finish(report))
    }

    async fn startup_checks(&self, root: &Path) -> Result<()> {
        self.preparer.prepare(root).await?;
        self.runner.check_available().await
    }

    fn finish(&self, report: RepairReport) -> RepairReport {
        let report = report.finish();
        emit_session_finished(
            &report.session_id,
            report.success,
            report.inner_attempts,
            report.outer_attempts,
        );
        METRICS.flush();

        if let Some(dir) = &self.report_dir {
            match write_report_artifact(&report, dir) {
                Ok(path) => info!(path = %path.display(), "report written"),
                Err(e) => warn!(error = %e, "failed to write report artifact"),
            }
        }
        report
    }
}
