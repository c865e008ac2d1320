//! Domain-level error taxonomy for buildmend.

use std::path::PathBuf;

/// buildmend domain errors.
///
/// Only a subset is fatal to a session: [`MendError::BuildToolUnavailable`],
/// [`MendError::PrepareFailed`] and [`MendError::InvalidConfig`]. The rest are
/// recorded against the attempt that produced them and the loops carry on.
#[derive(Debug, thiserror::Error)]
pub enum MendError {
    #[error("path {path:?} escapes workspace root {root:?}")]
    WorkspaceViolation { path: PathBuf, root: PathBuf },

    #[error("build tool unavailable: {0}")]
    BuildToolUnavailable(String),

    #[error("oracle failure: {0}")]
    OracleFailure(String),

    #[error("invalid changeset: {0}")]
    InvalidChangeset(String),

    #[error("changeset generation failed: {0}")]
    Generation(String),

    #[error("workspace preparation failed: {0}")]
    PrepareFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MendError {
    /// Whether this error must abort the whole session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MendError::BuildToolUnavailable(_)
                | MendError::PrepareFailed(_)
                | MendError::InvalidConfig(_)
        )
    }
}

/// Result type for buildmend domain operations.
pub type Result<T> = std::result::Result<T, MendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_violation_display() {
        let err = MendError::WorkspaceViolation {
            path: PathBuf::from("../etc/passwd"),
            root: PathBuf::from("/ws"),
        };
        let msg = err.to_string();
        assert!(msg.contains("escapes workspace root"));
        assert!(msg.contains("../etc/passwd"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = MendError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(MendError::BuildToolUnavailable("mvn".into()).is_fatal());
        assert!(MendError::PrepareFailed("busy".into()).is_fatal());
        assert!(!MendError::OracleFailure("empty".into()).is_fatal());
        assert!(!MendError::Generation("503".into()).is_fatal());
    }
}
