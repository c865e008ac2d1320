//! Change-proposal oracle contract.
//!
//! The oracle turns diagnostics plus the contents of the files they name into
//! a candidate changeset. Its output is untrusted: implementations hand back
//! raw text and [`propose_with_retry`] owns parsing and validation, so no
//! backend can slip an unvalidated changeset past the applier.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::diagnostics::summarize;
use crate::domain::{parse_proposal, ChangeInstruction, Diagnostic, MendError, Result};
use crate::metrics::METRICS;
use crate::obs::emit_oracle_failed;

/// Input handed to the oracle for one repair attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalRequest {
    /// Diagnostics from the most recent build attempt only.
    pub diagnostics: Vec<Diagnostic>,

    /// Workspace-relative path to file content, limited to files the
    /// diagnostics name.
    pub files: BTreeMap<String, String>,
}

impl ProposalRequest {
    pub fn new(diagnostics: Vec<Diagnostic>, files: BTreeMap<String, String>) -> Self {
        Self { diagnostics, files }
    }

    /// Rendered diagnostics, one per line.
    pub fn summary(&self) -> String {
        summarize(&self.diagnostics)
    }
}

/// A source of proposed fixes.
#[async_trait]
pub trait ChangeProposalOracle: Send + Sync {
    /// Return the raw proposal text for `request`.
    async fn propose(&self, request: &ProposalRequest) -> Result<String>;
}

/// Bounds on oracle calls within one repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OraclePolicy {
    /// Calls per repair attempt before giving up.
    pub max_attempts: u32,

    /// Wall-clock bound on a single call.
    pub timeout: Duration,
}

impl Default for OraclePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Ask the oracle for a validated changeset, retrying malformed responses.
///
/// Transport errors, timeouts and responses that fail validation all count
/// as one failed call. Returns the last failure once `policy.max_attempts`
/// calls have failed.
pub async fn propose_with_retry(
    oracle: &dyn ChangeProposalOracle,
    request: &ProposalRequest,
    policy: &OraclePolicy,
    repair_attempt: u32,
) -> Result<Vec<ChangeInstruction>> {
    let mut last_error = MendError::OracleFailure("oracle was never called".to_string());

    for oracle_try in 1..=policy.max_attempts {
        METRICS.inc_oracle_calls();
        let outcome = match tokio::time::timeout(policy.timeout, oracle.propose(request)).await {
            Err(_) => Err(MendError::OracleFailure(format!(
                "oracle timed out after {}s",
                policy.timeout.as_secs()
            ))),
            Ok(Err(e @ MendError::OracleFailure(_))) => Err(e),
            Ok(Err(e)) => Err(MendError::OracleFailure(e.to_string())),
            Ok(Ok(raw)) => parse_proposal(&raw),
        };

        match outcome {
            Ok(instructions) => return Ok(instructions),
            Err(e) => {
                METRICS.inc_oracle_failures();
                emit_oracle_failed(repair_attempt, oracle_try, &e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}
