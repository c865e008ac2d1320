//! Build phase command definitions.

use std::collections::BTreeMap;
use std::time::Duration;

use buildmend_core::{BuildPhase, BuildToolConfig};
use serde::{Deserialize, Serialize};

/// One resolved tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseCommand {
    /// Human-readable name, used in logs.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Extra environment variables.
    pub env: BTreeMap<String, String>,

    /// Timeout in milliseconds.
    pub timeout_ms: u64,
}

impl PhaseCommand {
    /// The command for `phase` under `tool`.
    pub fn for_phase(tool: &BuildToolConfig, phase: BuildPhase, timeout: Duration) -> Self {
        let args = match phase {
            BuildPhase::Compile => &tool.compile_args,
            BuildPhase::Package => &tool.package_args,
        };
        Self::from_parts(phase.name(), tool, args, timeout)
    }

    /// The availability probe, e.g. `mvn --version`.
    pub fn probe(tool: &BuildToolConfig, timeout: Duration) -> Self {
        Self::from_parts("probe", tool, &tool.probe_args, timeout)
    }

    /// A free-form command with no extra environment.
    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            command,
            env: BTreeMap::new(),
            timeout_ms: millis(timeout),
        }
    }

    fn from_parts(name: &str, tool: &BuildToolConfig, args: &[String], timeout: Duration) -> Self {
        let mut command = Vec::with_capacity(args.len() + 1);
        command.push(tool.program.clone());
        command.extend(args.iter().cloned());
        Self {
            name: name.to_string(),
            command,
            env: tool.env.clone(),
            timeout_ms: millis(timeout),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The command line joined with spaces, for logs.
    pub fn display(&self) -> String {
        self.command.join(" ")
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tool_phases() {
        let tool = BuildToolConfig::default();
        let compile = PhaseCommand::for_phase(&tool, BuildPhase::Compile, Duration::from_secs(300));
        assert_eq!(compile.name, "compile");
        assert_eq!(&compile.command[1..], ["clean", "compile"]);
        assert_eq!(compile.timeout(), Duration::from_secs(300));

        let package = PhaseCommand::for_phase(&tool, BuildPhase::Package, Duration::from_secs(300));
        assert_eq!(&package.command[1..], ["package"]);
    }

    #[test]
    fn test_probe_uses_program_and_env() {
        let mut tool = BuildToolConfig {
            program: "./mvnw".to_string(),
            ..BuildToolConfig::default()
        };
        tool.env.insert("MAVEN_OPTS".to_string(), "-Xmx1g".to_string());

        let probe = PhaseCommand::probe(&tool, Duration::from_secs(30));
        assert_eq!(probe.display(), "./mvnw --version");
        assert_eq!(probe.env.get("MAVEN_OPTS").map(String::as_str), Some("-Xmx1g"));
    }

    #[test]
    fn test_sub_second_timeout_is_kept() {
        let tool = BuildToolConfig::default();
        let compile = PhaseCommand::for_phase(&tool, BuildPhase::Compile, Duration::from_millis(250));
        assert_eq!(compile.timeout(), Duration::from_millis(250));

        let custom = PhaseCommand::custom("stop", vec!["true".to_string()], Duration::from_millis(1500));
        assert_eq!(custom.timeout_ms, 1500);
    }
}
