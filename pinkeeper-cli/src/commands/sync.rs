//! `pinkeeper sync` command handler

use tracing::info;

use pinkeeper_core::config::PinkeeperConfig;
use pinkeeper_security::AcceptAll;

use crate::cli::SyncArgs;
use crate::commands::{apply_provider_args, apply_workspace_args};
use crate::error::CliError;
use crate::orchestrator;
use crate::output::OutputWriter;
use crate::prompt::Prompter;
use crate::report::{FailureStage, RunReport};

/// Execute the `sync` command.
///
/// The report is always rendered first; the returned error only selects the exit code.
pub async fn execute(
    args: SyncArgs,
    mut config: PinkeeperConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    apply_args(&args, &mut config);
    config.validate()?;

    info!(
        root = %config.workspace.root,
        security = config.security.enabled,
        dry_run = config.mode.dry_run,
        "starting sync"
    );

    let report = if config.mode.interactive {
        orchestrator::run(&config, Prompter::stdio()).await?
    } else {
        orchestrator::run(&config, AcceptAll).await?
    };

    writer.render(&report)?;
    check(&report)
}

fn apply_args(args: &SyncArgs, config: &mut PinkeeperConfig) {
    apply_workspace_args(config, &args.workspace);
    if args.security {
        config.security.enabled = true;
    }
    apply_provider_args(config, &args.providers);
    config.mode.interactive |= args.interactive;
    config.mode.force |= args.force;
    config.mode.dry_run |= args.dry_run;
}

/// Map a finished run to its exit status.
///
/// Write failures outrank reconciliation failures, which outrank a scan with
/// no data, which outranks pending dry-run changes.
pub fn check(report: &RunReport) -> Result<(), CliError> {
    let write_failures = report.failures_in(FailureStage::Write);
    if write_failures > 0 {
        return Err(CliError::Write(write_failures));
    }
    let reconcile_failures = report.failures_in(FailureStage::Reconcile);
    if reconcile_failures > 0 {
        return Err(CliError::Reconciliation(reconcile_failures));
    }
    if report.security.as_ref().is_some_and(|s| !s.has_data()) {
        return Err(CliError::NoSecurityData);
    }
    if report.dry_run && report.pending() > 0 {
        return Err(CliError::PendingChanges(report.pending()));
    }
    Ok(())
}
