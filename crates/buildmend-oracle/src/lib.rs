//! buildmend oracle - HTTP collaborators for the repair loop
//!
//! Provides:
//! - `HttpOracle`: posts diagnostics and file contents, returns a proposed changeset
//! - `HttpChangesetSource`: asks an upstream generator for a fresh changeset

pub mod client;
pub mod generator;
pub mod oracle;

pub use client::{HttpConfig, USER_AGENT};
pub use generator::HttpChangesetSource;
pub use oracle::HttpOracle;
