//! `pinkeeper audit` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use pinkeeper_core::config::PinkeeperConfig;
use pinkeeper_security::{AcceptAll, PatchPlanner, PlanMode, detect_lockfile};

use crate::cli::AuditArgs;
use crate::commands::{apply_provider_args, apply_workspace_args};
use crate::error::CliError;
use crate::orchestrator;
use crate::output::{OutputWriter, Render};
use crate::report::SecuritySummary;

/// Execute the `audit` command.
///
/// Scans and lists the pins a `sync --force` would write. Never touches a manifest.
pub async fn execute(
    args: AuditArgs,
    mut config: PinkeeperConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    apply_workspace_args(&mut config, &args.workspace);
    apply_provider_args(&mut config, &args.providers);
    config.security.enabled = true;
    config.validate()?;

    let workspace = orchestrator::load_workspace(&config).await?;
    let scan = orchestrator::scan(&config, &workspace).await?;

    let outcome = PatchPlanner::new(&workspace.root)
        .with_lockfile(detect_lockfile(&workspace.root_dir))
        .plan(&scan.alerts, PlanMode::ReportOnly, &mut AcceptAll)
        .map_err(pinkeeper_core::error::PinkeeperError::from)?;

    info!(
        alerts = scan.alerts.len(),
        candidates = outcome.candidates.len(),
        "audit complete"
    );

    let report = AuditReport {
        root: workspace.root_dir.display().to_string(),
        manifests: workspace.manifests.len(),
        security: SecuritySummary::new(PlanMode::ReportOnly, scan, outcome),
    };
    writer.render(&report)?;

    if !report.security.has_data() {
        return Err(CliError::NoSecurityData);
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub root: String,
    pub manifests: usize,
    pub security: SecuritySummary,
}

impl Render for AuditReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Audit: {}", self.root.bold())?;
        writeln!(w, "Manifests scanned: {}", self.manifests)?;
        writeln!(w)?;
        self.security.render_text(w)
    }
}
