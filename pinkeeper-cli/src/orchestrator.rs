//! Run orchestration -- one full reconcile pass over a workspace.
//!
//! # Steps
//!
//! 1. Resolve workspace members from config, falling back to the root manifest namespace
//! 2. Load every manifest in parallel (blocking reads)
//! 3. Build the dependents index
//! 4. When security is enabled: collect targets, run providers, aggregate, plan pins
//! 5. Reconcile every manifest and stage the renders
//! 6. Commit changed manifests atomically unless running dry
//!
//! A configuration error aborts before anything is written. Reconciliation and
//! write errors are recorded per manifest and never stop the other manifests.
//! `Decision::Abort` cancels the run before step 5.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use pinkeeper_core::config::PinkeeperConfig;
use pinkeeper_core::error::PinkeeperError;
use pinkeeper_core::metrics as m;
use pinkeeper_manifest::manifest::MANIFEST_FILE;
use pinkeeper_manifest::{
    DependentsIndex, Manifest, ManifestWriter, Reconciler, StagedWrite, WorkspaceResolver,
    WorkspaceSpec, WritePlan, manifest, stage,
};
use pinkeeper_security::{
    AggregateReport, Aggregator, DecisionSource, PatchPlanner, PlanMode, PlanOutcome,
    ProviderRegistry, collect_targets, detect_lockfile,
};

use crate::report::{FailureStage, ManifestChange, ManifestFailure, RunReport, SecuritySummary};

/// Manifests of one workspace, loaded and indexed.
#[derive(Debug, Clone)]
pub struct LoadedWorkspace {
    pub root_dir: PathBuf,
    pub root: Manifest,
    /// Root first, then members in path order
    pub manifests: Vec<Manifest>,
    pub index: DependentsIndex,
    pub warnings: Vec<String>,
}

fn join_error(e: tokio::task::JoinError) -> PinkeeperError {
    PinkeeperError::Io(std::io::Error::other(e))
}

/// Resolve and load every manifest named by the workspace configuration.
///
/// Flags and config take precedence over `pinkeeper.depPaths` / `pinkeeper.ignore`
/// in the root manifest. Ignore lists from both sources are combined.
pub async fn load_workspace(config: &PinkeeperConfig) -> Result<LoadedWorkspace, PinkeeperError> {
    let root_dir = PathBuf::from(&config.workspace.root);
    let root_path = root_dir.join(MANIFEST_FILE);

    let (root, resolved) = {
        let workspace = config.workspace.clone();
        let root_dir = root_dir.clone();
        let root_path = root_path.clone();
        tokio::task::spawn_blocking(move || {
            let root = Manifest::load(&root_path, &root_dir, true)?;
            let dep_paths = workspace
                .dep_paths
                .clone()
                .or_else(|| root.namespace_dep_paths());
            let mut ignore = workspace.ignore;
            ignore.extend(root.namespace_ignore());
            let resolved = WorkspaceResolver::new(&root_dir)
                .with_ignore(ignore)
                .resolve(&WorkspaceSpec::from_dep_paths(dep_paths.as_ref()), &root)?;
            Ok::<_, pinkeeper_manifest::ManifestError>((root, resolved))
        })
        .await
        .map_err(join_error)??
    };

    let manifests = manifest::load_all(&root_dir, resolved.manifests(), &root_path).await?;
    metrics::gauge!(m::MANIFESTS_LOADED).set(manifests.len() as f64);

    let index = DependentsIndex::from_manifests(&manifests, config.workspace.include_dev);
    info!(
        root = %root_dir.display(),
        manifests = manifests.len(),
        packages = index.len(),
        "workspace loaded"
    );

    Ok(LoadedWorkspace {
        root_dir,
        root,
        manifests,
        index,
        warnings: resolved.warnings,
    })
}

/// Run every configured provider against the workspace's scan targets.
pub async fn scan(
    config: &PinkeeperConfig,
    workspace: &LoadedWorkspace,
) -> Result<AggregateReport, PinkeeperError> {
    let targets = collect_targets(&workspace.index, &workspace.root)?;

    let security = config.security.clone();
    let root_dir = workspace.root_dir.clone();
    let registry =
        tokio::task::spawn_blocking(move || ProviderRegistry::from_config(&security, &root_dir))
            .await
            .map_err(join_error)??;

    info!(
        targets = targets.len(),
        providers = ?registry.ids(),
        "starting security scan"
    );
    let report = Aggregator::new(
        Duration::from_secs(config.security.timeout_secs),
        config.severity_threshold(),
    )
    .run(&registry, targets)
    .await;

    if !report.has_data() {
        warn!("no security provider returned data");
    }
    Ok(report)
}

/// Decide which security pins go into the write plan.
///
/// Interactive decisions read from a terminal, so they run on the blocking pool.
async fn plan<D>(
    workspace: &LoadedWorkspace,
    alerts: Vec<pinkeeper_core::types::SecurityAlert>,
    mode: PlanMode,
    mut decisions: D,
) -> Result<(PlanOutcome, D), PinkeeperError>
where
    D: DecisionSource + 'static,
{
    let lockfile = detect_lockfile(&workspace.root_dir);
    if mode != PlanMode::Interactive {
        let outcome = PatchPlanner::new(&workspace.root)
            .with_lockfile(lockfile)
            .plan(&alerts, mode, &mut decisions)?;
        return Ok((outcome, decisions));
    }

    let root = workspace.root.clone();
    let (outcome, decisions) = tokio::task::spawn_blocking(move || {
        let outcome = PatchPlanner::new(&root)
            .with_lockfile(lockfile)
            .plan(&alerts, mode, &mut decisions);
        (outcome, decisions)
    })
    .await
    .map_err(join_error)?;
    Ok((outcome?, decisions))
}

/// Reconcile one workspace end to end.
///
/// `decisions` is consulted for each security pin in interactive mode and is
/// notified of every orphaned override removal.
pub async fn run<D>(config: &PinkeeperConfig, decisions: D) -> Result<RunReport, PinkeeperError>
where
    D: DecisionSource + 'static,
{
    let workspace = load_workspace(config).await?;
    let mode = PlanMode::from_config(&config.mode);

    let (security, mut decisions) = if config.security.enabled {
        let report = scan(config, &workspace).await?;
        let (outcome, decisions) = plan(&workspace, report.alerts.clone(), mode, decisions).await?;
        (Some(SecuritySummary::new(mode, report, outcome)), decisions)
    } else {
        (None, decisions)
    };

    let empty = WritePlan::new();
    let write_plan = security.as_ref().map_or(&empty, |s| &s.plan.plan);
    let reconciler = Reconciler::new(&workspace.index).with_plan(write_plan);

    let mut changes = Vec::with_capacity(workspace.manifests.len());
    let mut failures = Vec::new();
    let mut staged: Vec<StagedWrite> = Vec::new();

    for manifest in &workspace.manifests {
        let result = reconciler
            .reconcile(manifest)
            .and_then(|rec| stage(manifest, &rec.edits).map(|write| (rec, write)));
        match result {
            Ok((rec, write)) => {
                for orphan in &rec.orphans {
                    decisions.notify_orphan(orphan);
                }
                for skipped in &rec.skipped {
                    warn!(
                        manifest = %rec.manifest,
                        package = %skipped.entry.package,
                        reason = %skipped.reason,
                        "security pin not applied"
                    );
                }
                changes.push(ManifestChange {
                    manifest: rec.manifest,
                    changed: write.changed,
                    written: false,
                    applied: rec.applied,
                    skipped: rec.skipped,
                    orphans_removed: rec.orphans,
                });
                if write.changed {
                    staged.push(write);
                }
            }
            Err(e) if e.is_per_manifest() => {
                warn!(manifest = %manifest.id(), error = %e, "manifest left unchanged");
                failures.push(ManifestFailure {
                    manifest: manifest.id().clone(),
                    stage: FailureStage::Reconcile,
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    if config.mode.dry_run {
        info!(pending = staged.len(), "dry run, nothing written");
    } else if !staged.is_empty() {
        for (id, result) in ManifestWriter::new().commit_all(staged).await? {
            match result {
                Ok(written) => {
                    if let Some(change) = changes.iter_mut().find(|c| c.manifest == id) {
                        change.written = written;
                    }
                }
                Err(e) => {
                    warn!(manifest = %id, error = %e, "manifest write failed");
                    failures.push(ManifestFailure {
                        manifest: id,
                        stage: FailureStage::Write,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    let report = RunReport {
        root: workspace.root_dir.display().to_string(),
        dry_run: config.mode.dry_run,
        changed: changes.iter().any(|c| c.changed),
        manifests: changes,
        security,
        failures,
        warnings: workspace.warnings,
    };
    info!(
        manifests = report.manifests.len(),
        written = report.written(),
        pending = report.pending(),
        orphans = report.orphans().count(),
        failures = report.failures.len(),
        "run complete"
    );
    Ok(report)
}
