//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Pinkeeper -- keeps npm override pins justified and patched.
///
/// Use `pinkeeper <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "pinkeeper", version, about, long_about = None)]
pub struct Cli {
    /// Path to the pinkeeper.toml configuration file.
    #[arg(short, long, default_value = "pinkeeper.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile override appendices and apply security pins.
    Sync(SyncArgs),

    /// Scan dependencies with the security providers without writing anything.
    Audit(AuditArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- shared ----

/// Workspace selection flags.
#[derive(Args, Debug, Default, Clone)]
pub struct WorkspaceArgs {
    /// Directory containing the root package.json.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Workspace members: `workspace` or comma-separated globs.
    #[arg(long, value_name = "workspace|GLOBS")]
    pub dep_paths: Option<String>,

    /// Glob excluded from workspace expansion (repeatable).
    #[arg(long = "ignore", value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Leave devDependencies out of the dependents index.
    #[arg(long)]
    pub no_dev: bool,
}

/// Security provider flags.
#[derive(Args, Debug, Default, Clone)]
pub struct ProviderArgs {
    /// Comma-separated provider ids (offline, github, snyk, npm-audit).
    #[arg(long, value_delimiter = ',')]
    pub providers: Vec<String>,

    /// Minimum severity to act on (low, medium, high, critical).
    #[arg(long)]
    pub severity: Option<String>,

    /// Per-provider timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

// ---- sync ----

/// Reconcile every manifest in the workspace.
#[derive(Args, Debug, Default, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    /// Run the security scan and plan patch pins.
    #[arg(long)]
    pub security: bool,

    #[command(flatten)]
    pub providers: ProviderArgs,

    /// Confirm each security pin before it is written.
    #[arg(short, long, conflicts_with = "force")]
    pub interactive: bool,

    /// Accept every security pin at or above the threshold.
    #[arg(short, long)]
    pub force: bool,

    /// Compute everything but write nothing; exits 3 when manifests would change.
    #[arg(long)]
    pub dry_run: bool,
}

// ---- audit ----

/// One-shot security scan of the workspace.
#[derive(Args, Debug, Default, Clone)]
pub struct AuditArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[command(flatten)]
    pub providers: ProviderArgs,
}

// ---- config ----

/// Manage pinkeeper configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, workspace, security, mode).
        #[arg(long)]
        section: Option<String>,
    },
}
