//! Scripted fakes for the repair loop's collaborators (testing only)
//!
//! Provides `ScriptedBuildRunner`, `FnBuildRunner`, `ScriptedOracle` and
//! `ScriptedChangesetSource` that satisfy the trait contracts without a real
//! build tool or network.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{BuildOutcome, MendError, Result};
use crate::oracle::{ChangeProposalOracle, ProposalRequest};
use crate::regeneration::ChangesetSource;
use crate::runner::BuildRunner;

// ---------------------------------------------------------------------------
// Build runners
// ---------------------------------------------------------------------------

/// Replays a fixed sequence of build outcomes; the last one repeats.
#[derive(Debug)]
pub struct ScriptedBuildRunner {
    outcomes: Mutex<VecDeque<BuildOutcome>>,
    last: Mutex<Option<BuildOutcome>>,
    available: bool,
    runs: AtomicU32,
}

impl ScriptedBuildRunner {
    pub fn new(outcomes: Vec<BuildOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            last: Mutex::new(None),
            available: true,
            runs: AtomicU32::new(0),
        }
    }

    /// A runner whose tool is missing.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    /// Number of `run` calls so far.
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildRunner for ScriptedBuildRunner {
    async fn check_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(MendError::BuildToolUnavailable("scripted tool missing".to_string()))
        }
    }

    async fn run(&self, _root: &Path, _timeout: Duration) -> BuildOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let next = self.outcomes.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last
                .clone()
                .expect("ScriptedBuildRunner needs at least one outcome"),
        }
    }
}

/// Computes each outcome from the current workspace contents.
pub struct FnBuildRunner<F>
where
    F: Fn(&Path) -> BuildOutcome + Send + Sync,
{
    build: F,
    runs: AtomicU32,
}

impl<F> FnBuildRunner<F>
where
    F: Fn(&Path) -> BuildOutcome + Send + Sync,
{
    pub fn new(build: F) -> Self {
        Self {
            build,
            runs: AtomicU32::new(0),
        }
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> BuildRunner for FnBuildRunner<F>
where
    F: Fn(&Path) -> BuildOutcome + Send + Sync,
{
    async fn check_available(&self) -> Result<()> {
        Ok(())
    }

    async fn run(&self, root: &Path, _timeout: Duration) -> BuildOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        (self.build)(root)
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Replays scripted oracle responses and records every request.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<ProposalRequest>>,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProposalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeProposalOracle for ScriptedOracle {
    async fn propose(&self, request: &ProposalRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(MendError::OracleFailure("script exhausted".to_string())))
    }
}

// ---------------------------------------------------------------------------
// Changeset source
// ---------------------------------------------------------------------------

/// Replays scripted changesets, one per regeneration attempt.
#[derive(Debug, Default)]
pub struct ScriptedChangesetSource {
    changesets: Mutex<VecDeque<Result<String>>>,
    calls: AtomicU32,
}

impl ScriptedChangesetSource {
    pub fn new(changesets: Vec<Result<String>>) -> Self {
        Self {
            changesets: Mutex::new(changesets.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangesetSource for ScriptedChangesetSource {
    async fn next_changeset(&self, _attempt: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.changesets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()))
    }
}
