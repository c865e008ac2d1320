//! Session configuration.
//!
//! [`RepairConfig`] is an explicit value threaded through constructors; there
//! is no process-wide configuration state. It can be loaded from a TOML file
//! where every key is optional, then adjusted by environment overrides and
//! CLI flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticsConfig;
use crate::domain::{MendError, Result};
use crate::oracle::OraclePolicy;

/// Environment variable overriding `oracle.token`.
pub const ORACLE_TOKEN_ENV: &str = "BUILDMEND_ORACLE_TOKEN";

/// Environment variable overriding `generator.token`.
pub const GENERATOR_TOKEN_ENV: &str = "BUILDMEND_GENERATOR_TOKEN";

/// How to invoke the external build tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildToolConfig {
    /// Executable name or path.
    pub program: String,

    /// Arguments for the compile phase.
    pub compile_args: Vec<String>,

    /// Arguments for the package phase.
    pub package_args: Vec<String>,

    /// Arguments for the availability probe.
    pub probe_args: Vec<String>,

    /// Extra environment variables for every invocation.
    pub env: BTreeMap<String, String>,
}

impl Default for BuildToolConfig {
    fn default() -> Self {
        let program = if cfg!(windows) { "mvn.cmd" } else { "mvn" };
        Self {
            program: program.to_string(),
            compile_args: vec!["clean".to_string(), "compile".to_string()],
            package_args: vec!["package".to_string()],
            probe_args: vec!["--version".to_string()],
            env: BTreeMap::new(),
        }
    }
}

/// An HTTP endpoint with an optional bearer token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointConfig {
    pub endpoint: Option<String>,

    #[serde(skip_serializing)]
    pub token: Option<String>,
}

/// Upstream changeset generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub endpoint: Option<String>,

    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Requirement text forwarded to the generator.
    pub requirement: Option<String>,
}

/// Command run once before a session to free the workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PrepareConfig {
    pub command: Option<Vec<String>>,
}

/// Configuration for one repair session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepairConfig {
    /// Workspace root.
    pub workspace: PathBuf,

    pub build: BuildToolConfig,

    /// Per-phase build timeout.
    pub build_timeout_secs: u64,

    /// Inner loop bound: build invocations per regeneration attempt.
    pub max_repair_attempts: u32,

    /// Outer loop bound: fresh changesets per session.
    pub max_regeneration_attempts: u32,

    /// Oracle calls per repair attempt.
    pub max_oracle_attempts: u32,

    pub oracle_timeout_secs: u64,

    pub max_diagnostics: usize,

    /// Remove `.bak` files once the session succeeds.
    pub cleanup_backups_on_success: bool,

    /// Where to persist report artifacts. No artifact when unset.
    pub report_dir: Option<PathBuf>,

    pub oracle: EndpointConfig,

    pub generator: GeneratorConfig,

    pub prepare: PrepareConfig,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            build: BuildToolConfig::default(),
            build_timeout_secs: 300,
            max_repair_attempts: 5,
            max_regeneration_attempts: 3,
            max_oracle_attempts: 2,
            oracle_timeout_secs: 120,
            max_diagnostics: 100,
            cleanup_backups_on_success: true,
            report_dir: None,
            oracle: EndpointConfig::default(),
            generator: GeneratorConfig::default(),
            prepare: PrepareConfig::default(),
        }
    }
}

impl RepairConfig {
    /// Parse from TOML text and validate.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RepairConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        Ok(config.with_env_overrides())
    }

    /// Pick up credentials from the environment when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(ORACLE_TOKEN_ENV) {
            self.oracle.token = Some(token);
        }
        if let Ok(token) = std::env::var(GENERATOR_TOKEN_ENV) {
            self.generator.token = Some(token);
        }
        self
    }

    /// Reject bounds and timeouts that would make a session meaningless.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.max_repair_attempts == 0, "max_repair_attempts must be at least 1"),
            (self.max_regeneration_attempts == 0, "max_regeneration_attempts must be at least 1"),
            (self.max_oracle_attempts == 0, "max_oracle_attempts must be at least 1"),
            (self.build_timeout_secs == 0, "build_timeout_secs must be positive"),
            (self.oracle_timeout_secs == 0, "oracle_timeout_secs must be positive"),
            (self.build.program.trim().is_empty(), "build.program must not be empty"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(MendError::InvalidConfig(reason.to_string())),
            None => Ok(()),
        }
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn oracle_policy(&self) -> OraclePolicy {
        OraclePolicy {
            max_attempts: self.max_oracle_attempts,
            timeout: Duration::from_secs(self.oracle_timeout_secs),
        }
    }

    pub fn diagnostics_config(&self) -> DiagnosticsConfig {
        DiagnosticsConfig {
            max_diagnostics: self.max_diagnostics,
        }
    }
}
