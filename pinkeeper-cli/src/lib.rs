//! Pinkeeper CLI library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `pinkeeper` is used as a binary (main.rs).
//!
//! # Module Structure
//!
//! - [`cli`]: clap argument definitions
//! - [`commands`]: one handler per subcommand
//! - [`orchestrator`]: load, scan, plan, reconcile, and write in one pass
//! - [`report`]: [`RunReport`](report::RunReport) and its rendering
//! - [`prompt`]: terminal [`DecisionSource`](pinkeeper_security::DecisionSource)
//! - [`output`]: text / JSON output switching
//! - [`logging`]: tracing subscriber setup
//! - [`error`]: [`CliError`](error::CliError) and exit codes

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod prompt;
pub mod report;
