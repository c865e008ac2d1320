//! Structured observability hooks for repair session lifecycle events.
//!
//! This module provides:
//! - Session-scoped tracing spans via the `SessionSpan` RAII guard
//! - Emission functions for key lifecycle events
//!
//! Events are emitted at `info!` level except failures, which use `warn!`.

use tracing::{info, warn};

use crate::domain::BuildPhase;

/// RAII guard that enters a session-scoped tracing span.
///
/// ```ignore
/// let _span = SessionSpan::enter("5f0c...");
/// // every event below is tagged with session_id
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str) -> Self {
        let span = tracing::info_span!("buildmend.session", session_id = %session_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_session_started(session_id: &str, workspace: &str, max_repairs: u32, max_regenerations: u32) {
    info!(
        event = "session.started",
        session_id = %session_id,
        workspace = %workspace,
        max_repairs = max_repairs,
        max_regenerations = max_regenerations,
    );
}

pub fn emit_build_finished(attempt: u32, phase: BuildPhase, success: bool, elapsed_ms: u64, timed_out: bool) {
    info!(
        event = "build.finished",
        attempt = attempt,
        phase = %phase,
        success = success,
        elapsed_ms = elapsed_ms,
        timed_out = timed_out,
    );
}

pub fn emit_attempt_failed(attempt: u32, phase: BuildPhase, diagnostics: usize) {
    warn!(
        event = "repair.attempt_failed",
        attempt = attempt,
        phase = %phase,
        diagnostics = diagnostics,
    );
}

pub fn emit_oracle_failed(attempt: u32, oracle_try: u32, error: &dyn std::fmt::Display) {
    warn!(event = "oracle.failed", attempt = attempt, oracle_try = oracle_try, error = %error);
}

pub fn emit_repair_exhausted(attempts: u32) {
    warn!(event = "repair.exhausted", attempts = attempts);
}

pub fn emit_session_finished(session_id: &str, success: bool, inner_attempts: u32, outer_attempts: u32) {
    info!(
        event = "session.finished",
        session_id = %session_id,
        success = success,
        inner_attempts = inner_attempts,
        outer_attempts = outer_attempts,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_span_create() {
        let _span = SessionSpan::enter("test-session-id");
        emit_build_finished(1, BuildPhase::Compile, false, 10, false);
    }
}
