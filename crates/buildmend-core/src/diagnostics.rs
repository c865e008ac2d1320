//! Build output diagnostics extraction.
//!
//! Raw build output is turned into [`Diagnostic`] entries by three ordered
//! passes over the same lines:
//!
//! 1. compilation errors with a `file:[line,column]` location,
//! 2. missing dependency artifacts,
//! 3. any other `[ERROR]` line.
//!
//! A line claimed by an earlier pass is never re-captured by a later one, and
//! the fallback pass drops messages an earlier pass already reported.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::domain::{Diagnostic, DiagnosticKind};
use crate::workspace::WorkspaceGuard;

static COMPILATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[ERROR\] (.+):\[(\d+),(\d+)\] (.+)").expect("COMPILATION_RE regex should compile")
});

static DEPENDENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[ERROR\] (.+) was not found").expect("DEPENDENCY_RE regex should compile")
});

static GENERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[ERROR\] (.+)").expect("GENERAL_RE regex should compile"));

/// Configuration for the diagnostics extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Maximum number of diagnostics to retain per attempt.
    pub max_diagnostics: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_diagnostics: 100,
        }
    }
}

/// Extract diagnostics with the default configuration.
pub fn extract(output: &str) -> Vec<Diagnostic> {
    extract_with_config(output, &DiagnosticsConfig::default())
}

/// Extract diagnostics from combined build output.
pub fn extract_with_config(output: &str, config: &DiagnosticsConfig) -> Vec<Diagnostic> {
    let lines: Vec<&str> = output.lines().collect();
    let mut claimed = vec![false; lines.len()];
    let mut collector = Collector::default();

    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = COMPILATION_RE.captures(line) else {
            continue;
        };
        let (Ok(line_no), Ok(column)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
            continue;
        };
        claimed[idx] = true;
        collector.push(
            Diagnostic::new(DiagnosticKind::Compilation, caps[4].trim())
                .with_location(caps[1].trim(), line_no, column)
                .with_evidence(line.trim()),
        );
    }

    for (idx, line) in lines.iter().enumerate() {
        if claimed[idx] {
            continue;
        }
        let Some(caps) = DEPENDENCY_RE.captures(line) else {
            continue;
        };
        claimed[idx] = true;
        collector.push(
            Diagnostic::new(
                DiagnosticKind::Dependency,
                format!("Missing dependency: {}", caps[1].trim()),
            )
            .with_evidence(line.trim()),
        );
    }

    let mut known_messages: HashSet<String> = collector
        .diagnostics
        .iter()
        .map(|d| d.message.clone())
        .collect();

    for (idx, line) in lines.iter().enumerate() {
        if claimed[idx] {
            continue;
        }
        let trimmed = line.trim();
        let Some(caps) = GENERAL_RE.captures(trimmed) else {
            continue;
        };
        let message = caps[1].trim();
        if message.is_empty() || !known_messages.insert(message.to_string()) {
            continue;
        }
        collector.push(Diagnostic::new(DiagnosticKind::General, message).with_evidence(trimmed));
    }

    let mut diagnostics = collector.diagnostics;
    if diagnostics.len() > config.max_diagnostics {
        debug!(
            extracted = diagnostics.len(),
            kept = config.max_diagnostics,
            "truncating diagnostics"
        );
        diagnostics.truncate(config.max_diagnostics);
    }
    diagnostics
}

/// Render diagnostics one per line for prompts and logs.
pub fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(Diagnostic::summary_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read the files named in `diagnostics`, keyed by workspace-relative path.
///
/// Files outside the workspace or that cannot be read are skipped.
pub fn collect_relevant_files(
    diagnostics: &[Diagnostic],
    guard: &WorkspaceGuard,
) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();

    for file in diagnostics.iter().filter_map(|d| d.file.as_deref()) {
        let resolved = match guard.resolve(file) {
            Ok(path) => path,
            Err(e) => {
                warn!(file = %file, error = %e, "diagnostic names a file outside the workspace");
                continue;
            }
        };
        let Some(relative) = guard.relative_to_root(&resolved) else {
            continue;
        };
        if files.contains_key(&relative) {
            continue;
        }
        match std::fs::read_to_string(&resolved) {
            Ok(content) => {
                files.insert(relative, content);
            }
            Err(e) => warn!(file = %file, error = %e, "could not read file for diagnostic"),
        }
    }

    files
}

/// Accumulates diagnostics, dropping exact repeats.
#[derive(Default)]
struct Collector {
    diagnostics: Vec<Diagnostic>,
    seen: HashSet<(DiagnosticKind, Option<String>, Option<u32>, Option<u32>, String)>,
}

impl Collector {
    fn push(&mut self, diagnostic: Diagnostic) {
        let key = (
            diagnostic.kind,
            diagnostic.file.clone(),
            diagnostic.line,
            diagnostic.column,
            diagnostic.message.clone(),
        );
        if self.seen.insert(key) {
            self.diagnostics.push(diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_compilation_line_yields_single_diagnostic() {
        let diags = extract("[ERROR] Foo.java:[10,5] cannot find symbol");
        assert_eq!(diags.len(), 1);
        let d = &diags[0];
        assert_eq!(d.kind, DiagnosticKind::Compilation);
        assert_eq!(d.file.as_deref(), Some("Foo.java"));
        assert_eq!(d.line, Some(10));
        assert_eq!(d.column, Some(5));
        assert_eq!(d.message, "cannot find symbol");
    }

    #[test]
    fn test_dependency_line() {
        let diags = extract("[ERROR] commons-lang3-3.12.jar was not found");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::Dependency);
        assert_eq!(diags[0].message, "Missing dependency: commons-lang3-3.12.jar");
        assert!(diags[0].file.is_none());
    }

    #[test]
    fn test_general_fallback_and_ordering() {
        let output = "\
[INFO] Scanning for projects...
[ERROR] Failed to execute goal org.apache.maven.plugins:maven-compiler-plugin
[ERROR] /ws/src/main/java/App.java:[3,8] ';' expected
[ERROR] junit-4.13.jar was not found
[WARNING] something mild
";
        let diags = extract(output);
        let kinds: Vec<DiagnosticKind> = diags.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::Compilation,
                DiagnosticKind::Dependency,
                DiagnosticKind::General
            ]
        );
        assert!(diags[2].message.starts_with("Failed to execute goal"));
    }

    #[test]
    fn test_prefixed_lines_match_every_pass() {
        let output = "\
12:00:01 [ERROR] Failed to execute goal compile
12:00:02 [ERROR] src/A.java:[2,4] ';' expected
12:00:03 [ERROR] guava-33.jar was not found
";
        let diags = extract(output);
        let kinds: Vec<DiagnosticKind> = diags.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::Compilation,
                DiagnosticKind::Dependency,
                DiagnosticKind::General
            ]
        );
        assert_eq!(diags[2].message, "Failed to execute goal compile");
        assert_eq!(diags[2].evidence.as_deref(), Some("12:00:01 [ERROR] Failed to execute goal compile"));
    }

    #[test]
    fn test_general_drops_messages_already_reported() {
        let output = "[ERROR] A.java:[1,1] boom\n[ERROR] boom\n[ERROR] boom\n[ERROR] other";
        let diags = extract(output);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[1].kind, DiagnosticKind::General);
        assert_eq!(diags[1].message, "other");
    }

    #[test]
    fn test_repeated_compilation_errors_collapse() {
        let line = "[ERROR] Foo.java:[10,5] cannot find symbol";
        let diags = extract(&format!("{line}\n{line}\n"));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_bare_marker_and_clean_output_yield_nothing() {
        assert!(extract("[ERROR] \n[INFO] BUILD SUCCESS").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_max_diagnostics_truncates() {
        let output = (0..10)
            .map(|i| format!("[ERROR] problem {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let diags = extract_with_config(&output, &DiagnosticsConfig { max_diagnostics: 3 });
        assert_eq!(diags.len(), 3);
        assert_eq!(diags[0].message, "problem 0");
    }

    #[test]
    fn test_summarize() {
        let diags = extract("[ERROR] Foo.java:[10,5] cannot find symbol\n[ERROR] BUILD FAILURE");
        assert_eq!(
            summarize(&diags),
            "- compilation: Foo.java:10 - cannot find symbol\n- general: N/A:N/A - BUILD FAILURE"
        );
    }

    #[test]
    fn test_collect_relevant_files() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        std::fs::write(dir.path().join("src/Foo.java"), "class Foo {").expect("write");
        let guard = WorkspaceGuard::new(dir.path()).expect("guard");
        let absolute = guard.root().join("src/Foo.java");

        let diags = vec![
            Diagnostic::new(DiagnosticKind::Compilation, "a").with_location("src/Foo.java", 1, 1),
            Diagnostic::new(DiagnosticKind::Compilation, "b")
                .with_location(absolute.to_string_lossy(), 2, 1),
            Diagnostic::new(DiagnosticKind::Compilation, "c").with_location("../Elsewhere.java", 1, 1),
            Diagnostic::new(DiagnosticKind::Compilation, "d").with_location("src/Missing.java", 1, 1),
            Diagnostic::new(DiagnosticKind::General, "e"),
        ];

        let files = collect_relevant_files(&diags, &guard);
        assert_eq!(files.len(), 1);
        assert_eq!(files.get("src/Foo.java").map(String::as_str), Some("class Foo {"));
    }
}
