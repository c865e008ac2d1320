//! buildmend CI - process-backed build execution
//!
//! Provides the pieces that touch real processes:
//! - Runs the configured build tool's compile and package phases
//! - Probes the build tool once before a session
//! - Prepares the workspace with an operator-supplied command

pub mod phase;
pub mod prepare;
pub mod runner;

// Re-export key types
pub use phase::PhaseCommand;
pub use prepare::CommandPreparer;
pub use runner::{execute, Execution, ToolBuildRunner, PROBE_TIMEOUT};
