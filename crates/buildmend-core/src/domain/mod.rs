//! Domain models for buildmend.
//!
//! Canonical definitions for the core entities:
//! - `ChangeInstruction`: one file-level edit from a changeset
//! - `Diagnostic`: one structured build problem
//! - `BuildAttempt` / `BuildOutcome`: results of build invocations

pub mod build;
pub mod change;
pub mod diagnostic;
pub mod error;

pub use build::{BuildAttempt, BuildOutcome, BuildPhase, TIMEOUT_SENTINEL};
pub use change::{parse_changeset, parse_proposal, strip_code_fence, ChangeAction, ChangeInstruction};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use error::{MendError, Result};
