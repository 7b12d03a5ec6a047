//! WritePlan — 한 번의 실행에서 적용할 override 변경 목록

use std::fmt;

use pinkeeper_core::types::OverrideMechanism;
use serde::Serialize;

use crate::manifest::ManifestId;

/// 계획 항목 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    /// 대상 manifest
    pub manifest: ManifestId,
    /// 기록할 메커니즘
    pub mechanism: OverrideMechanism,
    /// 패키지 이름
    pub package: String,
    /// 기존 고정 버전 (없으면 새 override)
    pub from_version: Option<String>,
    /// 새 고정 버전
    pub to_version: String,
    /// appendix에 기록될 이유
    pub reason: String,
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from_version {
            Some(from) => write!(
                f,
                "{}: {} {} -> {} via {}",
                self.manifest, self.package, from, self.to_version, self.mechanism
            ),
            None => write!(
                f,
                "{}: {} pin {} via {}",
                self.manifest, self.package, self.to_version, self.mechanism
            ),
        }
    }
}

/// 순서가 있는 계획 항목 목록
///
/// 한 실행의 모든 항목은 함께 기록되거나 하나도 기록되지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WritePlan {
    entries: Vec<PlanEntry>,
}

impl WritePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// 항목을 추가합니다. 같은 manifest와 패키지의 기존 항목은 교체됩니다.
    pub fn push(&mut self, entry: PlanEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.manifest == entry.manifest && e.package == entry.package)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// 특정 manifest의 항목
    pub fn for_manifest<'a>(&'a self, id: &'a ManifestId) -> impl Iterator<Item = &'a PlanEntry> {
        self.entries.iter().filter(move |e| &e.manifest == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<PlanEntry> for WritePlan {
    fn from_iter<I: IntoIterator<Item = PlanEntry>>(iter: I) -> Self {
        let mut plan = Self::new();
        for entry in iter {
            plan.push(entry);
        }
        plan
    }
}
