//! Normalized build diagnostic types.

use serde::{Deserialize, Serialize};

/// Which pattern produced a diagnostic.
///
/// The kinds call for different repairs: compilation errors usually need a
/// source edit, dependency errors a manifest edit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Compilation,
    Dependency,
    General,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Compilation => "compilation",
            DiagnosticKind::Dependency => "dependency",
            DiagnosticKind::General => "general",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized diagnostic from build output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,

    /// Human-readable message.
    pub message: String,

    /// Source file path as reported by the build tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Line number (1-indexed). Compilation diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// Column number (1-indexed). Compilation diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    /// The raw output line the diagnostic was extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic without location.
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
            column: None,
            evidence: None,
        }
    }

    /// Set file location.
    pub fn with_location(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Set evidence snippet.
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    /// One-line rendering: `- <kind>: <file>:<line> - <message>`.
    pub fn summary_line(&self) -> String {
        let file = self.file.as_deref().unwrap_or("N/A");
        let line = self
            .line
            .map(|l| l.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        format!("- {}: {}:{} - {}", self.kind, file, line, self.message)
    }
}
