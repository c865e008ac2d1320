//! Build runner trait.
//!
//! Process-backed execution lives in `buildmend-ci`; the repair loop only
//! depends on this trait so it can be driven by scripted runners in tests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{BuildOutcome, Result};

/// Trait for build backends.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Check that the build tool can be invoked at all.
    ///
    /// Fails with [`crate::MendError::BuildToolUnavailable`]; callers treat
    /// that as fatal.
    async fn check_available(&self) -> Result<()>;

    /// Run the compile phase, then the package phase if compile passed.
    ///
    /// Each phase is bounded by `timeout`. Failures, including timeouts, are
    /// reported inside the returned outcome rather than as errors.
    async fn run(&self, root: &Path, timeout: Duration) -> BuildOutcome;
}
