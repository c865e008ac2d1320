//! Global atomic counters for buildmend observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the regeneration controller does this when a
//! session ends).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters shared by every session in the process.
pub struct Metrics {
    builds_run: AtomicU64,
    build_timeouts: AtomicU64,
    oracle_calls: AtomicU64,
    oracle_failures: AtomicU64,
    instructions_applied: AtomicU64,
    apply_errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            builds_run: AtomicU64::new(0),
            build_timeouts: AtomicU64::new(0),
            oracle_calls: AtomicU64::new(0),
            oracle_failures: AtomicU64::new(0),
            instructions_applied: AtomicU64::new(0),
            apply_errors: AtomicU64::new(0),
        }
    }

    pub fn inc_builds(&self) {
        self.builds_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_run", "counter incremented");
    }

    pub fn inc_build_timeouts(&self) {
        self.build_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "build_timeouts", "counter incremented");
    }

    pub fn inc_oracle_calls(&self) {
        self.oracle_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "oracle_calls", "counter incremented");
    }

    pub fn inc_oracle_failures(&self) {
        self.oracle_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "oracle_failures", "counter incremented");
    }

    pub fn inc_instructions_applied(&self) {
        self.instructions_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_apply_errors(&self) {
        self.apply_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "apply_errors", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            builds_run = self.builds_run(),
            build_timeouts = self.build_timeouts(),
            oracle_calls = self.oracle_calls(),
            oracle_failures = self.oracle_failures(),
            instructions_applied = self.instructions_applied(),
            apply_errors = self.apply_errors(),
        );
    }

    pub fn builds_run(&self) -> u64 {
        self.builds_run.load(Ordering::Relaxed)
    }

    pub fn build_timeouts(&self) -> u64 {
        self.build_timeouts.load(Ordering::Relaxed)
    }

    pub fn oracle_calls(&self) -> u64 {
        self.oracle_calls.load(Ordering::Relaxed)
    }

    pub fn oracle_failures(&self) -> u64 {
        self.oracle_failures.load(Ordering::Relaxed)
    }

    pub fn instructions_applied(&self) -> u64 {
        self.instructions_applied.load(Ordering::Relaxed)
    }

    pub fn apply_errors(&self) -> u64 {
        self.apply_errors.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.builds_run.store(0, Ordering::Relaxed);
        self.build_timeouts.store(0, Ordering::Relaxed);
        self.oracle_calls.store(0, Ordering::Relaxed);
        self.oracle_failures.store(0, Ordering::Relaxed);
        self.instructions_applied.store(0, Ordering::Relaxed);
        self.apply_errors.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.builds_run(), 0);
        m.inc_builds();
        m.inc_builds();
        assert_eq!(m.builds_run(), 2);

        m.inc_oracle_calls();
        m.inc_oracle_failures();
        assert_eq!(m.oracle_calls(), 1);
        assert_eq!(m.oracle_failures(), 1);

        m.inc_build_timeouts();
        assert_eq!(m.build_timeouts(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_builds();
        m.inc_instructions_applied();
        m.inc_apply_errors();
        m.reset();
        assert_eq!(m.builds_run(), 0);
        assert_eq!(m.instructions_applied(), 0);
        assert_eq!(m.apply_errors(), 0);
    }
}
