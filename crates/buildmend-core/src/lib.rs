//! buildmend core library
//!
//! Applies a changeset to a workspace, builds it, and repairs failures with
//! a pluggable proposal oracle under explicit attempt bounds.

pub mod apply;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod oracle;
pub mod regeneration;
pub mod repair;
pub mod report;
pub mod runner;
pub mod telemetry;
pub mod workspace;

pub use domain::{
    parse_changeset, parse_proposal, strip_code_fence, BuildAttempt, BuildOutcome, BuildPhase,
    ChangeAction, ChangeInstruction, Diagnostic, DiagnosticKind, MendError, Result, TIMEOUT_SENTINEL,
};

pub use apply::{ApplyError, ApplyResult, ChangeApplier};
pub use config::{
    BuildToolConfig, EndpointConfig, GeneratorConfig, PrepareConfig, RepairConfig,
    GENERATOR_TOKEN_ENV, ORACLE_TOKEN_ENV,
};
pub use diagnostics::{collect_relevant_files, extract, extract_with_config, summarize, DiagnosticsConfig};
pub use oracle::{propose_with_retry, ChangeProposalOracle, OraclePolicy, ProposalRequest};
pub use regeneration::{
    ChangesetSource, FileChangesetSource, NoopPreparer, RegenerationController, WorkspacePreparer,
};
pub use repair::{AttemptRecord, RepairController, RepairOutcome, RepairSession, RepairSettings, RepairState};
pub use report::{read_report_artifact, write_report_artifact, RepairReport};
pub use runner::BuildRunner;
pub use workspace::{backup_path, BackupRecord, WorkspaceGuard, BACKUP_SUFFIX};

pub use metrics::METRICS;
pub use obs::{
    emit_attempt_failed, emit_build_finished, emit_oracle_failed, emit_repair_exhausted,
    emit_session_finished, emit_session_started, SessionSpan,
};
pub use telemetry::init_tracing;

/// buildmend version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
