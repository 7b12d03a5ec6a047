//! Appendix 조정기
//!
//! manifest 하나의 override 목록을 [`DependentsIndex`]와 비교해
//! 유지/갱신/삭제할 항목과 새 appendix를 계산합니다.
//!
//! # 규칙
//!
//! 1. override를 정당화하는 직접 의존성이 인덱스에 없으면 orphan으로 삭제합니다.
//! 2. 남은 override의 dependents는 매번 인덱스에서 다시 계산합니다.
//! 3. 계획 항목이 새 버전을 주면 그 버전이 이기고 appendix 키가 바뀝니다.
//!    계획은 flat 항목에만 대응되며, flat 항목이 없으면 새로 만듭니다.
//! 4. reason은 계획이 새 값을 주지 않는 한 이전 키(`name@이전버전`)에서 유지됩니다.
//! 5. 각 항목은 원래 메커니즘 필드에 다시 기록됩니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use pinkeeper_core::error::ReconciliationError;
use pinkeeper_core::metrics as m;
use pinkeeper_core::types::OverrideMechanism;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::appendix::{Appendix, AppendixEntry, appendix_key};
use crate::edits::ManifestEdits;
use crate::error::ManifestError;
use crate::graph::DependentsIndex;
use crate::manifest::{Manifest, ManifestId};
use crate::overrides::{OverrideEntry, location_for, parse_overrides};
use crate::plan::{PlanEntry, WritePlan};

/// orphan override 삭제 알림
///
/// 삭제는 확인 대상이 아니며 항상 적용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanNotice {
    pub manifest: ManifestId,
    pub package: String,
    pub version: String,
    pub mechanism: OverrideMechanism,
}

impl fmt::Display for OrphanNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: removed {}@{} from {} (no remaining dependents)",
            self.manifest, self.package, self.version, self.mechanism
        )
    }
}

/// 적용되지 않은 계획 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPlanEntry {
    pub entry: PlanEntry,
    pub reason: String,
}

/// manifest 하나의 조정 결과
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub manifest: ManifestId,
    /// manifest에 적용할 편집
    pub edits: ManifestEdits,
    /// 최종 appendix
    pub appendix: Appendix,
    /// 삭제된 orphan override
    pub orphans: Vec<OrphanNotice>,
    /// 적용된 계획 항목
    pub applied: Vec<PlanEntry>,
    /// 건너뛴 계획 항목
    pub skipped: Vec<SkippedPlanEntry>,
}

/// Appendix 조정기
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    index: &'a DependentsIndex,
    plan: Option<&'a WritePlan>,
}

impl<'a> Reconciler<'a> {
    pub fn new(index: &'a DependentsIndex) -> Self {
        Self { index, plan: None }
    }

    /// 보안 패치 계획을 함께 반영합니다.
    pub fn with_plan(mut self, plan: &'a WritePlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// manifest 하나를 조정합니다.
    ///
    /// # Errors
    ///
    /// override 필드 형식이 잘못되었거나 같은 대상이 메커니즘마다 다른 버전으로
    /// 고정되어 있으면 에러를 반환합니다. 다른 manifest의 조정에는 영향이 없습니다.
    pub fn reconcile(&self, manifest: &Manifest) -> Result<Reconciliation, ManifestError> {
        let id = manifest.id();
        let entries = parse_overrides(manifest)?;
        check_conflicts(id, &entries)?;

        let previous = Appendix::from_manifest(manifest);
        let planned: BTreeMap<&str, &PlanEntry> = self
            .plan
            .into_iter()
            .flat_map(|plan| plan.for_manifest(id))
            .map(|e| (e.package.as_str(), e))
            .collect();

        let mut edits = ManifestEdits::new();
        let mut appendix = Appendix::new();
        let mut orphans = Vec::new();
        let mut covered: BTreeSet<&str> = BTreeSet::new();

        for entry in &entries {
            let dependents = self.index.appendix_dependents(entry.lookup_name());
            if dependents.is_empty() {
                info!(
                    manifest = %id,
                    package = %entry.package,
                    version = %entry.version,
                    mechanism = %entry.mechanism,
                    "removing orphaned override"
                );
                edits.remove_override(entry.mechanism, entry.location.clone());
                orphans.push(OrphanNotice {
                    manifest: id.clone(),
                    package: entry.package.clone(),
                    version: entry.version.clone(),
                    mechanism: entry.mechanism,
                });
                continue;
            }

            let mut reason = previous
                .reason(&entry.appendix_key())
                .map(str::to_owned);
            let mut version = entry.version.clone();

            // 중첩/selector 항목은 다른 경로의 사본만 고정하므로 계획을 대신하지 못함
            if entry.is_flat()
                && let Some(plan_entry) = planned.get(entry.package.as_str())
            {
                if plan_entry.to_version != entry.version {
                    debug!(
                        manifest = %id,
                        package = %entry.package,
                        from = %entry.version,
                        to = %plan_entry.to_version,
                        "updating pinned version"
                    );
                    edits.set_override(
                        entry.mechanism,
                        entry.location.clone(),
                        plan_entry.to_version.clone(),
                    );
                }
                version = plan_entry.to_version.clone();
                if !plan_entry.reason.is_empty() {
                    reason = Some(plan_entry.reason.clone());
                }
                covered.insert(entry.package.as_str());
            }

            appendix.merge(
                appendix_key(&entry.package, &version),
                AppendixEntry { dependents, reason },
            );
        }

        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        for plan_entry in planned.values() {
            if covered.contains(plan_entry.package.as_str()) {
                applied.push((*plan_entry).clone());
                continue;
            }
            let dependents = self.index.appendix_dependents(&plan_entry.package);
            if dependents.is_empty() {
                warn!(
                    manifest = %id,
                    package = %plan_entry.package,
                    "skipping planned override: no manifest declares this package"
                );
                skipped.push(SkippedPlanEntry {
                    entry: (*plan_entry).clone(),
                    reason: "no manifest declares this package".to_owned(),
                });
                continue;
            }
            edits.set_override(
                plan_entry.mechanism,
                location_for(plan_entry.mechanism, &[], &plan_entry.package),
                plan_entry.to_version.clone(),
            );
            appendix.merge(
                appendix_key(&plan_entry.package, &plan_entry.to_version),
                AppendixEntry {
                    dependents,
                    reason: (!plan_entry.reason.is_empty()).then(|| plan_entry.reason.clone()),
                },
            );
            applied.push((*plan_entry).clone());
        }

        if !orphans.is_empty() {
            metrics::counter!(m::ORPHANS_REMOVED_TOTAL).increment(orphans.len() as u64);
        }

        edits.replace_appendix(appendix.clone());
        Ok(Reconciliation {
            manifest: id.clone(),
            edits,
            appendix,
            orphans,
            applied,
            skipped,
        })
    }
}

/// 같은 대상이 서로 다른 메커니즘에서 다른 버전으로 고정되었는지 검사합니다.
fn check_conflicts(id: &ManifestId, entries: &[OverrideEntry]) -> Result<(), ReconciliationError> {
    let mut seen: BTreeMap<_, &OverrideEntry> = BTreeMap::new();
    for entry in entries {
        match seen.get(&entry.target()) {
            Some(first) if first.mechanism != entry.mechanism && first.version != entry.version => {
                return Err(ReconciliationError::ConflictingMechanisms {
                    manifest: id.to_string(),
                    package: entry.package.clone(),
                    first: first.mechanism.to_string(),
                    first_version: first.version.clone(),
                    second: entry.mechanism.to_string(),
                    second_version: entry.version.clone(),
                });
            }
            Some(_) => {}
            None => {
                seen.insert(entry.target(), entry);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root(text: &str) -> Manifest {
        Manifest::parse(ManifestId::new("package.json"), "package.json", text, true).unwrap()
    }

    fn member(dir: &str, text: &str) -> Manifest {
        let id = format!("{dir}/package.json");
        Manifest::parse(ManifestId::new(id.clone()), id, text, false).unwrap()
    }

    fn plan_entry(package: &str, from: Option<&str>, to: &str, reason: &str) -> PlanEntry {
        PlanEntry {
            manifest: ManifestId::new("package.json"),
            mechanism: OverrideMechanism::Overrides,
            package: package.to_owned(),
            from_version: from.map(str::to_owned),
            to_version: to.to_owned(),
            reason: reason.to_owned(),
        }
    }

    #[test]
    fn records_dependents_for_member_declaration() {
        let r = root(r#"{"name": "root", "overrides": {"qs": "6.11.2"}}"#);
        let m = member("packages/api", r#"{"name": "api", "dependencies": {"qs": "^6.9.0"}}"#);
        let index = DependentsIndex::from_manifests(&[r.clone(), m], true);

        let result = Reconciler::new(&index).reconcile(&r).unwrap();
        assert!(result.orphans.is_empty());
        let entry = result.appendix.get("qs@6.11.2").unwrap();
        assert_eq!(entry.dependents.get("api").map(String::as_str), Some("^6.9.0"));

        let value = result.edits.apply(r.value());
        assert_eq!(value["overrides"]["qs"], "6.11.2");
        assert_eq!(
            value["pinkeeper"]["appendix"]["qs@6.11.2"]["dependents"],
            json!({"api": "^6.9.0"})
        );
    }

    #[test]
    fn orphan_removes_override_and_appendix() {
        let r = root(
            r#"{"name": "root", "overrides": {"left-pad": "1.3.0"},
                "pinkeeper": {"appendix": {"left-pad@1.3.0": {"dependents": {"old": "^1.0.0"}}}}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let result = Reconciler::new(&index).reconcile(&r).unwrap();

        assert_eq!(result.orphans.len(), 1);
        assert_eq!(result.orphans[0].package, "left-pad");
        assert_eq!(result.edits.apply(r.value()), json!({"name": "root"}));
    }

    #[test]
    fn dependents_set_grows_without_version_change() {
        let r = root(
            r#"{"name": "root", "dependencies": {"lodash": "^4.17.0"}, "overrides": {"lodash": "4.17.21"},
                "pinkeeper": {"appendix": {"lodash@4.17.21": {"dependents": {"root": "^4.17.0"}, "reason": "CVE-2021-23337"}}}}"#,
        );
        let m = member("packages/b", r#"{"name": "b", "dependencies": {"lodash": "~4.17.19"}}"#);
        let index = DependentsIndex::from_manifests(&[r.clone(), m], true);
        let result = Reconciler::new(&index).reconcile(&r).unwrap();

        let entry = result.appendix.get("lodash@4.17.21").unwrap();
        assert_eq!(entry.dependents.len(), 2);
        assert_eq!(entry.reason.as_deref(), Some("CVE-2021-23337"));
    }

    #[test]
    fn plan_version_change_swaps_appendix_key() {
        let r = root(
            r#"{"name": "root", "dependencies": {"pkg": "^1.0.0"}, "overrides": {"pkg": "1.0.0"},
                "pinkeeper": {"appendix": {"pkg@1.0.0": {"dependents": {"root": "^1.0.0"}, "reason": "manual"}}}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let plan: WritePlan = [plan_entry("pkg", Some("1.0.0"), "1.0.1", "GHSA-xxxx")]
            .into_iter()
            .collect();
        let result = Reconciler::new(&index).with_plan(&plan).reconcile(&r).unwrap();

        assert!(!result.appendix.contains("pkg@1.0.0"));
        let entry = result.appendix.get("pkg@1.0.1").unwrap();
        assert_eq!(entry.reason.as_deref(), Some("GHSA-xxxx"));
        assert_eq!(result.applied.len(), 1);

        let value = result.edits.apply(r.value());
        assert_eq!(value["overrides"]["pkg"], "1.0.1");
        assert!(value["pinkeeper"]["appendix"].get("pkg@1.0.0").is_none());
    }

    #[test]
    fn reason_is_kept_when_plan_supplies_none() {
        let r = root(
            r#"{"name": "root", "dependencies": {"pkg": "^1.0.0"}, "overrides": {"pkg": "1.0.0"},
                "pinkeeper": {"appendix": {"pkg@1.0.0": {"dependents": {}, "reason": "manual"}}}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let plan: WritePlan = [plan_entry("pkg", Some("1.0.0"), "1.0.0", "")]
            .into_iter()
            .collect();
        let result = Reconciler::new(&index).with_plan(&plan).reconcile(&r).unwrap();
        assert_eq!(result.appendix.reason("pkg@1.0.0"), Some("manual"));
    }

    #[test]
    fn plan_creates_new_override_in_chosen_mechanism() {
        let r = root(r#"{"name": "root", "dependencies": {"minimist": "^1.2.0"}, "resolutions": {}}"#);
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let mut entry = plan_entry("minimist", None, "1.2.6", "CVE-2021-44906");
        entry.mechanism = OverrideMechanism::Resolutions;
        let plan: WritePlan = [entry].into_iter().collect();

        let result = Reconciler::new(&index).with_plan(&plan).reconcile(&r).unwrap();
        let value = result.edits.apply(r.value());
        assert_eq!(value["resolutions"]["minimist"], "1.2.6");
        assert_eq!(
            value["pinkeeper"]["appendix"]["minimist@1.2.6"]["reason"],
            "CVE-2021-44906"
        );
    }

    #[test]
    fn plan_for_undeclared_package_is_skipped() {
        let r = root(r#"{"name": "root"}"#);
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let plan: WritePlan = [plan_entry("ghost", None, "1.0.0", "x")].into_iter().collect();
        let result = Reconciler::new(&index).with_plan(&plan).reconcile(&r).unwrap();
        assert_eq!(result.skipped.len(), 1);
        assert!(result.applied.is_empty());
        assert_eq!(result.edits.apply(r.value()), *r.value());
    }

    #[test]
    fn nested_override_justified_by_parent() {
        let r = root(
            r#"{"name": "root", "dependencies": {"express": "^4.17.0"}, "overrides": {"express": {"qs": "6.11.2"}}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let result = Reconciler::new(&index).reconcile(&r).unwrap();
        assert!(result.orphans.is_empty());
        assert_eq!(
            result.appendix.get("qs@6.11.2").unwrap().dependents["root"],
            "^4.17.0"
        );
    }

    #[test]
    fn nested_pin_does_not_absorb_root_plan() {
        let r = root(
            r#"{"name": "root", "dependencies": {"qs": "^6.5.0", "express": "^4.17.0"},
                "overrides": {"express": {"qs": "6.5.0"}}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let plan: WritePlan = [plan_entry("qs", None, "6.11.2", "CVE-2022-24999")]
            .into_iter()
            .collect();
        let result = Reconciler::new(&index).with_plan(&plan).reconcile(&r).unwrap();

        assert_eq!(result.applied.len(), 1);
        let value = result.edits.apply(r.value());
        assert_eq!(value["overrides"]["qs"], "6.11.2");
        assert_eq!(value["overrides"]["express"]["qs"], "6.5.0");
        assert_eq!(
            value["pinkeeper"]["appendix"]["qs@6.11.2"]["reason"],
            "CVE-2022-24999"
        );
        assert!(result.appendix.contains("qs@6.5.0"));
    }

    #[test]
    fn selector_pin_does_not_absorb_root_plan() {
        let r = root(
            r#"{"name": "root", "dependencies": {"qs": "^6.5.0"},
                "pnpm": {"overrides": {"qs@<6.10": "6.9.7"}}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let mut entry = plan_entry("qs", None, "6.11.2", "CVE-2022-24999");
        entry.mechanism = OverrideMechanism::PnpmOverrides;
        let plan: WritePlan = [entry].into_iter().collect();
        let result = Reconciler::new(&index).with_plan(&plan).reconcile(&r).unwrap();

        let value = result.edits.apply(r.value());
        assert_eq!(value["pnpm"]["overrides"]["qs"], "6.11.2");
        assert_eq!(value["pnpm"]["overrides"]["qs@<6.10"], "6.9.7");
    }

    #[test]
    fn conflicting_mechanisms_fail() {
        let r = root(
            r#"{"dependencies": {"qs": "^6"}, "overrides": {"qs": "6.11.2"}, "resolutions": {"qs": "6.11.0"}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let err = Reconciler::new(&index).reconcile(&r).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::Conflict(ReconciliationError::ConflictingMechanisms { .. })
        ));
    }

    #[test]
    fn same_version_in_two_mechanisms_is_allowed() {
        let r = root(
            r#"{"name": "r", "dependencies": {"qs": "^6"}, "overrides": {"qs": "6.11.2"}, "resolutions": {"qs": "6.11.2"}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let result = Reconciler::new(&index).reconcile(&r).unwrap();
        assert_eq!(result.appendix.len(), 1);
    }

    #[test]
    fn stale_appendix_entry_without_override_is_dropped() {
        let r = root(
            r#"{"name": "r", "pinkeeper": {"appendix": {"gone@1.0.0": {"dependents": {"r": "1"}}}}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let result = Reconciler::new(&index).reconcile(&r).unwrap();
        assert!(result.appendix.is_empty());
        assert_eq!(result.edits.apply(r.value()), json!({"name": "r"}));
    }

    #[test]
    fn manifest_without_overrides_is_untouched() {
        let r = root(r#"{"name": "r", "dependencies": {"a": "1"}}"#);
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&r), true);
        let result = Reconciler::new(&index).reconcile(&r).unwrap();
        assert_eq!(result.edits.apply(r.value()), *r.value());
    }
}
