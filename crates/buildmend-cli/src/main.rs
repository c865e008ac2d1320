//! buildmend - build verification and repair loop CLI
//!
//! ## Commands
//!
//! - `run`: apply a changeset, build, and repair failures under bounds
//! - `apply`: apply a changeset without building
//! - `diagnose`: extract diagnostics from a saved build log
//! - `cleanup`: remove `.bak` files left in a workspace
//! - `report`: print a stored session report after verifying its digest

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use buildmend_ci::{CommandPreparer, ToolBuildRunner};
use buildmend_core::{
    extract_with_config, parse_changeset, read_report_artifact, ChangeApplier, ChangesetSource,
    FileChangesetSource, RegenerationController, RepairConfig, RepairReport, WorkspaceGuard,
};
use buildmend_oracle::{HttpChangesetSource, HttpOracle};

#[derive(Parser)]
#[command(name = "buildmend")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Apply changesets, build, and repair failures", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON results
    #[arg(long, global = true)]
    json: bool,

    /// Session configuration file (TOML)
    #[arg(short, long, global = true, env = "BUILDMEND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a changeset, build, and repair until the build passes or bounds run out
    Run {
        /// Workspace root (overrides config)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Changeset file, re-read on every regeneration attempt
        #[arg(long, conflicts_with = "requirement")]
        changeset: Option<PathBuf>,

        /// Requirement text sent to the configured generator endpoint
        #[arg(long)]
        requirement: Option<String>,

        /// Build invocations per regeneration attempt
        #[arg(long)]
        max_repairs: Option<u32>,

        /// Fresh changesets per session
        #[arg(long)]
        max_regenerations: Option<u32>,

        /// Per-phase build timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Directory for the session report artifact
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Apply a changeset to the workspace without building
    Apply {
        /// Changeset file (JSON)
        #[arg(long)]
        changeset: PathBuf,

        /// Workspace root (overrides config)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Extract diagnostics from a saved build log
    Diagnose {
        /// Build log file
        log: PathBuf,
    },

    /// Remove backup files from the workspace
    Cleanup {
        /// Workspace root (overrides config)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Show a stored session report
    Report {
        /// Session ID
        #[arg(long)]
        session: String,

        /// Directory holding report artifacts
        #[arg(long)]
        dir: PathBuf,
    },
}

/// CLI flags that override the config file.
#[derive(Debug, Default)]
struct Overrides {
    workspace: Option<PathBuf>,
    requirement: Option<String>,
    max_repairs: Option<u32>,
    max_regenerations: Option<u32>,
    timeout: Option<u64>,
    report_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct ApplySummary<'a> {
    touched: usize,
    backups: usize,
    errors: &'a [buildmend_core::ApplyError],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    buildmend_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            workspace,
            changeset,
            requirement,
            max_repairs,
            max_regenerations,
            timeout,
            report_dir,
        } => {
            let overrides = Overrides {
                workspace,
                requirement,
                max_repairs,
                max_regenerations,
                timeout,
                report_dir,
            };
            let config = apply_overrides(config, overrides)?;
            cmd_run(&config, changeset.as_deref(), cli.json).await
        }
        Commands::Apply { changeset, workspace } => {
            let config = apply_overrides(
                config,
                Overrides {
                    workspace,
                    ..Overrides::default()
                },
            )?;
            cmd_apply(&config, &changeset, cli.json)
        }
        Commands::Diagnose { log } => cmd_diagnose(&config, &log, cli.json),
        Commands::Cleanup { workspace } => {
            let config = apply_overrides(
                config,
                Overrides {
                    workspace,
                    ..Overrides::default()
                },
            )?;
            cmd_cleanup(&config)
        }
        Commands::Report { session, dir } => cmd_report(&session, &dir, cli.json),
    }
}

/// Load the config file if given, otherwise defaults; then environment overrides.
fn load_config(path: Option<&Path>) -> Result<RepairConfig> {
    match path {
        Some(path) => RepairConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(RepairConfig::default().with_env_overrides()),
    }
}

fn apply_overrides(mut config: RepairConfig, overrides: Overrides) -> Result<RepairConfig> {
    if let Some(workspace) = overrides.workspace {
        config.workspace = workspace;
    }
    if let Some(requirement) = overrides.requirement {
        config.generator.requirement = Some(requirement);
    }
    if let Some(max) = overrides.max_repairs {
        config.max_repair_attempts = max;
    }
    if let Some(max) = overrides.max_regenerations {
        config.max_regeneration_attempts = max;
    }
    if let Some(timeout) = overrides.timeout {
        config.build_timeout_secs = timeout;
    }
    if let Some(dir) = overrides.report_dir {
        config.report_dir = Some(dir);
    }
    config.validate()?;
    Ok(config)
}

fn open_workspace(config: &RepairConfig) -> Result<WorkspaceGuard> {
    WorkspaceGuard::new(&config.workspace)
        .with_context(|| format!("Failed to open workspace {}", config.workspace.display()))
}

/// Run a full repair session
async fn cmd_run(config: &RepairConfig, changeset: Option<&Path>, json: bool) -> Result<()> {
    let guard = open_workspace(config)?;
    let oracle_timeout = config.oracle_policy().timeout;

    let source: Arc<dyn ChangesetSource> = match changeset {
        Some(path) => Arc::new(FileChangesetSource::new(path)),
        None => Arc::new(
            HttpChangesetSource::from_config(&config.generator, oracle_timeout)
                .context("No --changeset given and the generator is not configured")?,
        ),
    };
    let oracle = HttpOracle::from_config(&config.oracle, oracle_timeout)
        .context("Failed to configure the proposal oracle")?;

    let mut controller = RegenerationController::new(
        guard,
        Arc::new(ToolBuildRunner::new(config.build.clone())),
        Arc::new(oracle),
        source,
        config,
    );
    if let Some(command) = &config.prepare.command {
        controller = controller.with_preparer(Arc::new(CommandPreparer::new(
            command.clone(),
            config.build_timeout(),
        )));
    }

    info!(workspace = %config.workspace.display(), "starting repair session");
    let report = controller.run().await.context("Repair session aborted")?;
    print_report(&report, json)?;

    if report.success {
        Ok(())
    } else {
        anyhow::bail!(
            "Build still failing after {} regeneration attempt(s)",
            report.outer_attempts
        )
    }
}

/// Apply a changeset file once
fn cmd_apply(config: &RepairConfig, changeset: &Path, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(changeset)
        .with_context(|| format!("Failed to read {}", changeset.display()))?;
    let instructions = parse_changeset(&raw)?;
    let applier = ChangeApplier::new(open_workspace(config)?);
    let result = applier.apply(&instructions);

    if json {
        let summary = ApplySummary {
            touched: result.touched,
            backups: result.backups.len(),
            errors: &result.errors,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Applied {} instruction(s): {} file(s) changed, {} backup(s)",
            instructions.len(),
            result.touched,
            result.backups.len()
        );
        for error in &result.errors {
            println!("  ✗ {}", error);
        }
    }

    if result.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("{} instruction(s) failed", result.errors.len())
    }
}

/// Print diagnostics found in a build log
fn cmd_diagnose(config: &RepairConfig, log: &Path, json: bool) -> Result<()> {
    let output = std::fs::read_to_string(log).with_context(|| format!("Failed to read {}", log.display()))?;
    let diagnostics = extract_with_config(&output, &config.diagnostics_config());

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
        return Ok(());
    }

    if diagnostics.is_empty() {
        println!("No diagnostics found");
        return Ok(());
    }
    for diagnostic in &diagnostics {
        println!("{}", diagnostic.summary_line());
    }
    println!("\n{} diagnostic(s)", diagnostics.len());
    Ok(())
}

/// Remove backup files
fn cmd_cleanup(config: &RepairConfig) -> Result<()> {
    let removed = open_workspace(config)?.cleanup_backups();
    println!("Removed {} backup file(s)", removed);
    Ok(())
}

/// Show a stored report
fn cmd_report(session: &str, dir: &Path, json: bool) -> Result<()> {
    let report = read_report_artifact(session, dir)
        .with_context(|| format!("Failed to read report for session {}", session))?;
    print_report(&report, json)?;
    println!("Report digest verified");
    Ok(())
}

fn print_report(report: &RepairReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Session: {}", report.session_id);
    println!("Status: {}", if report.success { "✓ PASSED" } else { "✗ FAILED" });
    println!(
        "Attempts: {} build(s) in last round, {} regeneration(s)",
        report.inner_attempts, report.outer_attempts
    );
    let elapsed = report.finished_at - report.started_at;
    println!("Duration: {}ms", elapsed.num_milliseconds());

    if !report.changeset_errors.is_empty() {
        println!("Changeset errors:");
        for error in &report.changeset_errors {
            println!("  - {}", error);
        }
    }
    if !report.apply_errors.is_empty() {
        println!("Apply errors:");
        for error in &report.apply_errors {
            println!("  - {}", error);
        }
    }
    if !report.success {
        println!("\nLast build log:\n{}", report.combined_log);
    }
    Ok(())
}
