//! offline provider -- 번들 권고 DB 조회

use std::path::Path;
use std::sync::Arc;

use pinkeeper_core::error::ProviderError;
use pinkeeper_core::types::{ScanTarget, SecurityAlert};

use super::SecurityProvider;
use crate::advisory_db::{AdvisoryDb, AdvisoryRecord};
use crate::error::SecurityError;
use crate::version;

pub const PROVIDER_ID: &str = "offline";

/// 대상 버전에 매칭된 권고
#[derive(Debug, Clone)]
pub struct OfflineFinding {
    pub record: AdvisoryRecord,
    pub target: ScanTarget,
}

/// 권고 DB를 메모리에서 조회하는 provider
pub struct OfflineProvider {
    db: Arc<AdvisoryDb>,
}

impl OfflineProvider {
    pub fn new(db: AdvisoryDb) -> Self {
        Self { db: Arc::new(db) }
    }

    /// 번들 DB만 사용합니다.
    pub fn bundled() -> Result<Self, SecurityError> {
        Ok(Self::new(AdvisoryDb::bundled()?))
    }

    /// 번들 DB에 `dir/npm.json`을 병합합니다. 같은 권고 ID는 로컬 쪽이 이깁니다.
    pub fn with_local_db(dir: &Path) -> Result<Self, SecurityError> {
        let local = AdvisoryDb::load_from_dir(dir)?;
        Ok(Self::new(AdvisoryDb::bundled()?.merge(local)))
    }

    pub fn db(&self) -> &AdvisoryDb {
        &self.db
    }

    fn findings(&self, targets: &[ScanTarget]) -> Vec<OfflineFinding> {
        targets
            .iter()
            .flat_map(|target| {
                self.db
                    .lookup(&target.name)
                    .into_iter()
                    .filter(|record| version::is_affected(&target.version, &record.affected_ranges))
                    .map(|record| OfflineFinding {
                        record: record.clone(),
                        target: target.clone(),
                    })
            })
            .collect()
    }
}

impl SecurityProvider for OfflineProvider {
    type Finding = OfflineFinding;

    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn scan(&self, targets: &[ScanTarget]) -> Result<Vec<SecurityAlert>, ProviderError> {
        let alerts: Vec<SecurityAlert> = self
            .findings(targets)
            .iter()
            .map(|finding| self.to_alert(finding))
            .collect();
        tracing::debug!(
            targets = targets.len(),
            alerts = alerts.len(),
            "offline advisory lookup complete"
        );
        Ok(alerts)
    }

    /// 대상 버전이 속한 범위의 수정 버전, 없으면 권고의 대표 수정 버전
    fn extract_patched_version(&self, finding: &OfflineFinding) -> Option<String> {
        version::matching_range(&finding.target.version, &finding.record.affected_ranges)
            .and_then(|range| range.fixed.clone())
            .or_else(|| finding.record.fixed_version.clone())
    }

    fn to_alert(&self, finding: &OfflineFinding) -> SecurityAlert {
        let record = &finding.record;
        let patched_version = self.extract_patched_version(finding);
        SecurityAlert {
            package_name: finding.target.name.clone(),
            current_version: finding.target.version.clone(),
            severity: self.normalize_severity(&record.severity),
            title: record.title.clone(),
            description: record.description.clone(),
            cve: record.cve.clone().or_else(|| Some(record.id.clone())),
            fix_available: patched_version.is_some(),
            patched_version,
            vulnerable_versions: record.vulnerable_versions.clone(),
            url: record.url.clone(),
            provider: PROVIDER_ID.to_owned(),
            corroborated_by: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinkeeper_core::types::Severity;

    #[tokio::test]
    async fn finds_bundled_lodash_advisory() {
        let provider = OfflineProvider::bundled().unwrap();
        let alerts = provider
            .scan(&[ScanTarget::new("lodash", "4.17.15")])
            .await
            .unwrap();

        let cmd = alerts
            .iter()
            .find(|a| a.cve.as_deref() == Some("CVE-2021-23337"))
            .unwrap();
        assert_eq!(cmd.severity, Severity::High);
        assert_eq!(cmd.patched_version.as_deref(), Some("4.17.21"));
        assert_eq!(cmd.provider, "offline");
        assert!(cmd.fix_available);
    }

    #[tokio::test]
    async fn patched_version_follows_matching_branch() {
        let provider = OfflineProvider::bundled().unwrap();
        let alerts = provider
            .scan(&[ScanTarget::new("minimist", "0.0.8")])
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].patched_version.as_deref(), Some("0.2.4"));
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn fixed_versions_are_clean() {
        let provider = OfflineProvider::bundled().unwrap();
        let alerts = provider
            .scan(&[
                ScanTarget::new("lodash", "4.17.21"),
                ScanTarget::new("qs", "6.11.2"),
                ScanTarget::new("unknown-package", "1.0.0"),
            ])
            .await
            .unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn moderate_severity_is_normalized() {
        let provider = OfflineProvider::bundled().unwrap();
        let alerts = provider
            .scan(&[ScanTarget::new("axios", "1.5.0")])
            .await
            .unwrap();
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(alerts[0].patched_version.as_deref(), Some("1.6.0"));
    }

    #[tokio::test]
    async fn local_db_extends_bundled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("npm.json"),
            r#"[{"id": "LOCAL-1", "package": "left-pad", "affected_ranges": [{"introduced": null, "fixed": "1.3.0"}],
                "fixed_version": "1.3.0", "severity": "low", "title": "local advisory"}]"#,
        )
        .unwrap();

        let provider = OfflineProvider::with_local_db(dir.path()).unwrap();
        let alerts = provider
            .scan(&[ScanTarget::new("left-pad", "1.1.0")])
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].cve.as_deref(), Some("LOCAL-1"));
        assert!(!provider.db().lookup("lodash").is_empty());
    }
}
