//! Run report payloads
//!
//! [`RunReport`] is what one `sync` pass produced. It is rendered through
//! [`OutputWriter`](crate::output::OutputWriter) as text or JSON.

use std::fmt;
use std::io::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use pinkeeper_core::types::{SecurityAlert, Severity};
use pinkeeper_manifest::{ManifestId, OrphanNotice, PlanEntry, SkippedPlanEntry};
use pinkeeper_security::{AggregateReport, PlanMode, PlanOutcome, ProviderOutcome, ProviderStatus};

use crate::output::Render;

/// Result of one reconcile pass over a workspace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Workspace root directory
    pub root: String,
    pub dry_run: bool,
    /// True when at least one manifest differs from its on-disk content
    pub changed: bool,
    pub manifests: Vec<ManifestChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecuritySummary>,
    pub failures: Vec<ManifestFailure>,
    pub warnings: Vec<String>,
}

impl RunReport {
    /// Manifests that differ but were not written (dry run or write failure).
    pub fn pending(&self) -> usize {
        self.manifests
            .iter()
            .filter(|m| m.changed && !m.written)
            .count()
    }

    /// Manifests written to disk.
    pub fn written(&self) -> usize {
        self.manifests.iter().filter(|m| m.written).count()
    }

    /// Every orphaned override removed in this pass.
    pub fn orphans(&self) -> impl Iterator<Item = &OrphanNotice> {
        self.manifests.iter().flat_map(|m| m.orphans_removed.iter())
    }

    pub fn failures_in(&self, stage: FailureStage) -> usize {
        self.failures.iter().filter(|f| f.stage == stage).count()
    }

    pub fn change(&self, manifest: &str) -> Option<&ManifestChange> {
        self.manifests.iter().find(|m| m.manifest.as_str() == manifest)
    }
}

/// Per-manifest outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestChange {
    pub manifest: ManifestId,
    pub changed: bool,
    pub written: bool,
    /// Security pins applied to this manifest
    pub applied: Vec<PlanEntry>,
    pub skipped: Vec<SkippedPlanEntry>,
    pub orphans_removed: Vec<OrphanNotice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Reconcile,
    Write,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconcile => write!(f, "reconcile"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// A manifest that was left untouched because of an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFailure {
    pub manifest: ManifestId,
    pub stage: FailureStage,
    pub error: String,
}

/// Security half of a run: provider outcomes, surviving alerts, and the patch plan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySummary {
    pub mode: PlanMode,
    pub providers: Vec<ProviderOutcome>,
    pub providers_succeeded: usize,
    pub alerts: Vec<SecurityAlert>,
    /// Alerts hidden by the severity threshold
    pub below_threshold: usize,
    pub plan: PlanOutcome,
}

impl SecuritySummary {
    pub fn new(mode: PlanMode, report: AggregateReport, plan: PlanOutcome) -> Self {
        Self {
            mode,
            providers: report.outcomes,
            providers_succeeded: report.providers_succeeded,
            alerts: report.alerts,
            below_threshold: report.below_threshold,
            plan,
        }
    }

    /// At least one provider returned data. Zero alerts with no data is not "clean".
    pub fn has_data(&self) -> bool {
        self.providers_succeeded > 0
    }
}

fn severity_colored(severity: Severity) -> ColoredString {
    let label = severity.as_str();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.normal(),
    }
}

fn mode_label(mode: PlanMode) -> &'static str {
    match mode {
        PlanMode::ReportOnly => "report only",
        PlanMode::Interactive => "interactive",
        PlanMode::Force => "force",
        PlanMode::DryRun => "dry run",
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.dry_run {
            writeln!(w, "Workspace: {} {}", self.root.bold(), "(dry run)".dimmed())?;
        } else {
            writeln!(w, "Workspace: {}", self.root.bold())?;
        }
        let changed = self.manifests.iter().filter(|m| m.changed).count();
        writeln!(
            w,
            "Manifests: {} loaded, {} changed",
            self.manifests.len() + self.failures_in(FailureStage::Reconcile),
            changed
        )?;
        for warning in &self.warnings {
            writeln!(w, "{} {}", "warning:".yellow(), warning)?;
        }
        writeln!(w)?;

        for change in &self.manifests {
            change.render(w, self.dry_run)?;
        }

        if let Some(security) = &self.security {
            writeln!(w)?;
            security.render_text(w)?;
        }

        if !self.failures.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Failures:".red().bold())?;
            for failure in &self.failures {
                writeln!(w, "  {} [{}] {}", failure.manifest, failure.stage, failure.error)?;
            }
        }
        Ok(())
    }
}

impl ManifestChange {
    fn render(&self, w: &mut dyn Write, dry_run: bool) -> std::io::Result<()> {
        let status = if self.written {
            "updated".green()
        } else if self.changed && dry_run {
            "would change".yellow()
        } else if self.changed {
            "not written".red()
        } else {
            "unchanged".dimmed()
        };
        writeln!(w, "  {:<40} {}", self.manifest.as_str(), status)?;

        for entry in &self.applied {
            writeln!(
                w,
                "    {} {}@{} via {} ({})",
                "+".green(),
                entry.package,
                entry.to_version,
                entry.mechanism,
                entry.reason
            )?;
        }
        for skipped in &self.skipped {
            writeln!(
                w,
                "    {} {}@{}: {}",
                "~".yellow(),
                skipped.entry.package,
                skipped.entry.to_version,
                skipped.reason
            )?;
        }
        for orphan in &self.orphans_removed {
            writeln!(
                w,
                "    {} {}@{} from {} (no remaining dependents)",
                "-".red(),
                orphan.package,
                orphan.version,
                orphan.mechanism
            )?;
        }
        Ok(())
    }
}

impl Render for SecuritySummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Security ({})", mode_label(self.mode).bold())?;
        for outcome in &self.providers {
            let detail = match &outcome.status {
                ProviderStatus::Ok { alerts } => format!("{alerts} alert(s)"),
                ProviderStatus::Unavailable { reason } | ProviderStatus::Failed { reason } => {
                    reason.clone()
                }
            };
            let label = match outcome.status {
                ProviderStatus::Ok { .. } => outcome.status.label().green(),
                _ => outcome.status.label().yellow(),
            };
            writeln!(
                w,
                "  {:<10} {:<12} {:>6}ms  {}",
                outcome.provider, label, outcome.elapsed_ms, detail
            )?;
        }
        writeln!(w)?;

        if !self.has_data() {
            writeln!(
                w,
                "{}",
                "No data available: every provider was unavailable.".red().bold()
            )?;
            return Ok(());
        }

        if self.alerts.is_empty() {
            writeln!(w, "{}", "No vulnerabilities found.".green())?;
        } else {
            writeln!(
                w,
                "{:<22} {:<10} {:<25} {:<12} Fixed",
                "Advisory", "Severity", "Package", "Version"
            )?;
            writeln!(w, "{}", "-".repeat(80))?;
            for alert in &self.alerts {
                writeln!(
                    w,
                    "{:<22} {:<10} {:<25} {:<12} {}",
                    alert.advisory_id(),
                    severity_colored(alert.severity),
                    alert.package_name,
                    alert.current_version,
                    alert.patched_version.as_deref().unwrap_or("N/A")
                )?;
            }
        }
        if self.below_threshold > 0 {
            writeln!(
                w,
                "{}",
                format!("({} below threshold, hidden)", self.below_threshold).dimmed()
            )?;
        }

        let plan = &self.plan;
        if !plan.candidates.is_empty() {
            writeln!(w)?;
            writeln!(w, "Patch candidates:")?;
            for candidate in &plan.candidates {
                let accepted = plan
                    .plan
                    .entries()
                    .iter()
                    .any(|e| e.package == candidate.package);
                let mark = if accepted { "+".green() } else { "?".dimmed() };
                writeln!(w, "  {} {}", mark, candidate)?;
            }
        }
        for candidate in &plan.already_pinned {
            writeln!(
                w,
                "  {} {} already pinned at or above {}",
                "=".dimmed(),
                candidate.package,
                candidate.to_version
            )?;
        }
        for alert in &plan.unfixable {
            writeln!(
                w,
                "  {} {}@{} has no patched version ({})",
                "!".red(),
                alert.package_name,
                alert.current_version,
                alert.advisory_id()
            )?;
        }
        Ok(())
    }
}
