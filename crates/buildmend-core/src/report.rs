//! Session reports and their on-disk artifacts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::apply::ApplyError;
use crate::domain::{MendError, Result};
use crate::repair::AttemptRecord;

const REPORT_FILE: &str = "report.json";
const DIGEST_FILE: &str = "report.digest";

/// Final result of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub session_id: String,
    pub success: bool,

    /// Output of the last build, verbatim.
    pub combined_log: String,

    /// Build invocations in the last inner loop.
    pub inner_attempts: u32,

    /// Changesets tried.
    pub outer_attempts: u32,

    /// Only populated when the session failed.
    #[serde(default)]
    pub apply_errors: Vec<ApplyError>,

    /// Failed builds of the last inner loop.
    #[serde(default)]
    pub history: Vec<AttemptRecord>,

    /// Outer attempts lost to an unusable changeset.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changeset_errors: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RepairReport {
    /// A fresh report with a new session id and no attempts yet.
    pub fn start() -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            success: false,
            combined_log: String::new(),
            inner_attempts: 0,
            outer_attempts: 0,
            apply_errors: Vec::new(),
            history: Vec::new(),
            changeset_errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Stamp the finish time.
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn session_dir(session_id: &str, dir: &Path) -> Result<PathBuf> {
    Uuid::parse_str(session_id)
        .map_err(|e| MendError::InvalidConfig(format!("invalid session id {session_id:?}: {e}")))?;
    Ok(dir.join(session_id))
}

/// Persist `<dir>/<session_id>/report.json` and `<dir>/<session_id>/report.digest`.
pub fn write_report_artifact(report: &RepairReport, dir: &Path) -> Result<PathBuf> {
    let session_dir = session_dir(&report.session_id, dir)?;
    std::fs::create_dir_all(&session_dir)?;

    let report_path = session_dir.join(REPORT_FILE);
    let json = serde_json::to_vec_pretty(report)?;

    std::fs::write(&report_path, &json)?;
    std::fs::write(session_dir.join(DIGEST_FILE), sha256_hex(&json).as_bytes())?;

    Ok(report_path)
}

/// Read `<dir>/<session_id>/report.json` and verify it against its digest.
pub fn read_report_artifact(session_id: &str, dir: &Path) -> Result<RepairReport> {
    let session_dir = session_dir(session_id, dir)?;

    let json = std::fs::read(session_dir.join(REPORT_FILE))?;
    let expected = std::fs::read_to_string(session_dir.join(DIGEST_FILE))?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(MendError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChangeAction;
    use tempfile::tempdir;

    fn failed_report() -> RepairReport {
        let mut report = RepairReport::start();
        report.combined_log = "[ERROR] A.java:[1,1] boom".to_string();
        report.inner_attempts = 5;
        report.outer_attempts = 3;
        report.apply_errors.push(ApplyError {
            path: "../x".to_string(),
            action: ChangeAction::Create,
            reason: "outside workspace".to_string(),
        });
        report.finish()
    }

    #[test]
    fn test_artifact_reloads_intact() {
        let dir = tempdir().expect("tempdir");
        let report = failed_report();

        let path = write_report_artifact(&report, dir.path()).expect("write");
        assert!(path.ends_with(format!("{}/report.json", report.session_id)));

        let loaded = read_report_artifact(&report.session_id, dir.path()).expect("read");
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_tampered_artifact_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let report = failed_report();
        let path = write_report_artifact(&report, dir.path()).expect("write");

        let tampered = std::fs::read_to_string(&path)
            .expect("read")
            .replace("\"success\": false", "\"success\": true");
        std::fs::write(&path, tampered).expect("rewrite");

        let err = read_report_artifact(&report.session_id, dir.path()).unwrap_err();
        assert!(matches!(err, MendError::DigestMismatch { .. }));
    }

    #[test]
    fn test_session_id_must_be_uuid() {
        let dir = tempdir().expect("tempdir");
        let err = read_report_artifact("../../etc", dir.path()).unwrap_err();
        assert!(matches!(err, MendError::InvalidConfig(_)));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
