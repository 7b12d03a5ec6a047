//! 패치 계획 -- 알림을 루트 manifest의 override 고정 계획으로 변환
//!
//! 패키지 매니저는 workspace 루트의 override만 적용하므로 모든 보안 고정은 루트 manifest에 기록됩니다.
//!
//! # 메커니즘 선택
//!
//! 1. 패키지에 대한 기존 override가 있으면 그 메커니즘
//! 2. 루트에 이미 있는 첫 override 필드 (`overrides`, `resolutions`, `pnpm.overrides`)
//! 3. lockfile로 추정한 패키지 매니저의 필드
//! 4. `overrides`
//!
//! # 확인
//!
//! interactive 모드에서는 후보마다 [`DecisionSource`]에 승인 여부를 묻습니다.
//! orphan 삭제는 확인 대상이 아니며 알림만 전달됩니다.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::Path;

use pinkeeper_core::config::ModeConfig;
use pinkeeper_core::types::{OverrideMechanism, SecurityAlert, Severity};
use pinkeeper_manifest::overrides::parse_overrides;
use pinkeeper_manifest::{Manifest, ManifestId, OrphanNotice, OverrideEntry, PlanEntry, WritePlan};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::SecurityError;
use crate::version;

/// lockfile → 메커니즘 (앞에 있을수록 우선)
const LOCKFILES: [(&str, OverrideMechanism); 6] = [
    ("pnpm-lock.yaml", OverrideMechanism::PnpmOverrides),
    ("yarn.lock", OverrideMechanism::Resolutions),
    ("package-lock.json", OverrideMechanism::Overrides),
    ("npm-shrinkwrap.json", OverrideMechanism::Overrides),
    ("bun.lock", OverrideMechanism::Overrides),
    ("bun.lockb", OverrideMechanism::Overrides),
];

/// 루트 디렉토리의 lockfile로 override 메커니즘을 추정합니다.
pub fn detect_lockfile(root_dir: &Path) -> Option<OverrideMechanism> {
    LOCKFILES
        .iter()
        .find(|(file, _)| root_dir.join(file).is_file())
        .map(|(file, mechanism)| {
            debug!(lockfile = *file, mechanism = %mechanism, "detected lockfile");
            *mechanism
        })
}

/// 보안 패치 적용 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanMode {
    /// 후보를 보고만 하고 기록하지 않음
    ReportOnly,
    /// 후보마다 확인
    Interactive,
    /// 모두 자동 승인
    Force,
    /// 모두 승인하되 manifest는 기록하지 않음
    DryRun,
}

impl PlanMode {
    /// 설정의 모드 플래그에서 결정합니다. dry-run이 가장 우선합니다.
    pub fn from_config(mode: &ModeConfig) -> Self {
        if mode.dry_run {
            Self::DryRun
        } else if mode.force {
            Self::Force
        } else if mode.interactive {
            Self::Interactive
        } else {
            Self::ReportOnly
        }
    }

    /// manifest를 실제로 기록하는지 여부
    pub fn writes(&self) -> bool {
        !matches!(self, Self::DryRun)
    }
}

/// 후보 하나에 대한 결정
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
    /// 승인하고 appendix reason을 바꿈
    Edit(String),
    /// 전체 실행 취소
    Abort,
}

/// 확인 요청을 받는 쪽
pub trait DecisionSource: Send {
    fn decide(&mut self, candidate: &PatchCandidate) -> Decision;

    /// orphan 삭제 알림 (확인 대상 아님)
    fn notify_orphan(&mut self, _notice: &OrphanNotice) {}
}

/// 모든 후보를 승인합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl DecisionSource for AcceptAll {
    fn decide(&mut self, _candidate: &PatchCandidate) -> Decision {
        Decision::Accept
    }
}

/// 미리 정한 순서대로 결정을 돌려줍니다. 소진되면 `Reject`입니다.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecisions {
    queue: VecDeque<Decision>,
    /// 질의된 후보 (순서대로)
    pub asked: Vec<PatchCandidate>,
    /// 전달받은 orphan 알림
    pub orphans: Vec<OrphanNotice>,
}

impl ScriptedDecisions {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            queue: decisions.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl DecisionSource for ScriptedDecisions {
    fn decide(&mut self, candidate: &PatchCandidate) -> Decision {
        self.asked.push(candidate.clone());
        self.queue.pop_front().unwrap_or(Decision::Reject)
    }

    fn notify_orphan(&mut self, notice: &OrphanNotice) {
        self.orphans.push(notice.clone());
    }
}

/// 제안된 보안 고정 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchCandidate {
    pub manifest: ManifestId,
    pub mechanism: OverrideMechanism,
    pub package: String,
    /// 기존 고정 버전
    pub from_version: Option<String>,
    pub to_version: String,
    /// 묶인 알림 중 가장 높은 심각도
    pub severity: Severity,
    /// 권고 식별자 (정렬, 중복 제거)
    pub advisories: Vec<String>,
    pub reason: String,
}

impl PatchCandidate {
    fn into_plan_entry(self, reason: Option<String>) -> PlanEntry {
        PlanEntry {
            manifest: self.manifest,
            mechanism: self.mechanism,
            package: self.package,
            from_version: self.from_version,
            to_version: self.to_version,
            reason: reason.unwrap_or(self.reason),
        }
    }
}

impl fmt::Display for PatchCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from_version {
            Some(from) => write!(
                f,
                "[{}] {} {} -> {} via {} ({})",
                self.severity, self.package, from, self.to_version, self.mechanism, self.reason
            ),
            None => write!(
                f,
                "[{}] {} pin {} via {} ({})",
                self.severity, self.package, self.to_version, self.mechanism, self.reason
            ),
        }
    }
}

/// 계획 결과
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutcome {
    /// 조정기에 넘길 계획
    pub plan: WritePlan,
    /// 제안된 모든 후보
    pub candidates: Vec<PatchCandidate>,
    /// 거부된 후보
    pub rejected: Vec<PatchCandidate>,
    /// 기존 고정이 이미 수정 버전 이상이라 제안하지 않은 후보
    pub already_pinned: Vec<PatchCandidate>,
    /// 수정 버전이 없는 알림
    pub unfixable: Vec<SecurityAlert>,
}

/// 패치 계획기
pub struct PatchPlanner<'a> {
    root: &'a Manifest,
    lockfile: Option<OverrideMechanism>,
}

impl<'a> PatchPlanner<'a> {
    pub fn new(root: &'a Manifest) -> Self {
        Self {
            root,
            lockfile: None,
        }
    }

    /// lockfile로 추정한 메커니즘을 설정합니다.
    pub fn with_lockfile(mut self, lockfile: Option<OverrideMechanism>) -> Self {
        self.lockfile = lockfile;
        self
    }

    /// 새 override에 사용할 메커니즘
    pub fn mechanism_for(&self, existing: Option<&OverrideEntry>) -> OverrideMechanism {
        if let Some(entry) = existing {
            return entry.mechanism;
        }
        self.root
            .present_mechanisms()
            .first()
            .copied()
            .or(self.lockfile)
            .unwrap_or(OverrideMechanism::Overrides)
    }

    /// 알림을 패키지별 후보로 묶습니다.
    pub fn candidates(&self, alerts: &[SecurityAlert]) -> Result<PlanOutcome, SecurityError> {
        let existing: Vec<OverrideEntry> = parse_overrides(self.root)?
            .into_iter()
            .filter(OverrideEntry::is_flat)
            .collect();

        let mut outcome = PlanOutcome::default();
        let mut by_package: BTreeMap<&str, Vec<&SecurityAlert>> = BTreeMap::new();
        for alert in alerts {
            match &alert.patched_version {
                Some(_) if alert.fix_available => {
                    by_package.entry(alert.package_name.as_str()).or_default().push(alert);
                }
                _ => outcome.unfixable.push(alert.clone()),
            }
        }

        for (package, group) in by_package {
            let to_version = group
                .iter()
                .filter_map(|a| a.patched_version.as_deref())
                .max_by(|a, b| version::compare(a, b))
                .unwrap_or_default()
                .to_owned();
            let severity = group.iter().map(|a| a.severity).max().unwrap_or_default();
            let mut advisories: Vec<String> =
                group.iter().map(|a| a.advisory_id().to_owned()).collect();
            advisories.sort();
            advisories.dedup();

            let current = existing.iter().find(|e| e.package == package);
            let candidate = PatchCandidate {
                manifest: self.root.id().clone(),
                mechanism: self.mechanism_for(current),
                package: package.to_owned(),
                from_version: current.map(|e| e.version.clone()),
                reason: advisories.join(", "),
                to_version,
                severity,
                advisories,
            };

            if let Some(entry) = current
                && version::satisfies_minimum(entry.version.trim_start_matches('='), &candidate.to_version)
            {
                debug!(
                    package,
                    pinned = %entry.version,
                    patched = %candidate.to_version,
                    "existing pin already includes fix"
                );
                outcome.already_pinned.push(candidate);
                continue;
            }
            outcome.candidates.push(candidate);
        }
        Ok(outcome)
    }

    /// 후보를 만들고 모드에 따라 계획을 확정합니다.
    ///
    /// `Decision::Abort`를 받으면 [`SecurityError::Cancelled`]를 반환합니다.
    pub fn plan(
        &self,
        alerts: &[SecurityAlert],
        mode: PlanMode,
        decisions: &mut dyn DecisionSource,
    ) -> Result<PlanOutcome, SecurityError> {
        let mut outcome = self.candidates(alerts)?;

        for candidate in &outcome.candidates {
            let decision = match mode {
                PlanMode::ReportOnly => Decision::Reject,
                PlanMode::Force | PlanMode::DryRun => Decision::Accept,
                PlanMode::Interactive => decisions.decide(candidate),
            };
            match decision {
                Decision::Accept => outcome.plan.push(candidate.clone().into_plan_entry(None)),
                Decision::Edit(reason) => {
                    let reason = Some(reason.trim().to_owned()).filter(|r| !r.is_empty());
                    outcome.plan.push(candidate.clone().into_plan_entry(reason));
                }
                Decision::Reject => {
                    if mode == PlanMode::Interactive {
                        info!(package = %candidate.package, "security patch rejected");
                    }
                    outcome.rejected.push(candidate.clone());
                }
                Decision::Abort => {
                    info!(package = %candidate.package, "run aborted during confirmation");
                    return Err(SecurityError::Cancelled);
                }
            }
        }

        info!(
            mode = ?mode,
            candidates = outcome.candidates.len(),
            accepted = outcome.plan.len(),
            unfixable = outcome.unfixable.len(),
            "security plan computed"
        );
        Ok(outcome)
    }
}
