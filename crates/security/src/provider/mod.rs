//! 보안 provider -- 취약점 조회 소스 추상화
//!
//! 모든 provider는 [`SecurityProvider`] trait을 구현하며,
//! 구성된 provider 집합은 [`Provider`] enum으로 정적 디스패치됩니다.
//!
//! | id | 구현 | 데이터 소스 |
//! |----|------|-------------|
//! | `offline` | [`OfflineProvider`] | 번들 권고 DB + 로컬 디렉토리 |
//! | `github` | [`GithubProvider`] | GitHub global advisories REST API |
//! | `snyk` | [`SnykProvider`] | `snyk test --json` |
//! | `npm-audit` | [`NpmAuditProvider`] | `npm audit --json` |

pub mod github;
pub mod npm_audit;
pub mod offline;
mod process;
pub mod snyk;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pinkeeper_core::config::SecurityConfig;
use pinkeeper_core::error::ProviderError;
use pinkeeper_core::types::{ScanTarget, SecurityAlert, Severity};

use crate::error::SecurityError;

pub use github::GithubProvider;
pub use npm_audit::NpmAuditProvider;
pub use offline::OfflineProvider;
pub use snyk::SnykProvider;

/// 보안 provider trait
///
/// `scan`은 대상 목록에 대한 알림을 반환합니다. 실패는 [`ProviderError`]로 보고되며
/// 집계기에서 해당 provider의 결과만 0건으로 처리됩니다.
///
/// 각 provider는 고유한 원본 응답 타입(`Finding`)을 가지며,
/// 심각도 정규화와 수정 버전 추출을 거쳐 [`SecurityAlert`]로 변환합니다.
pub trait SecurityProvider: Send + Sync {
    /// provider 원본 응답 항목
    type Finding;

    /// provider 식별자
    fn id(&self) -> &str;

    /// 대상 목록을 스캔합니다.
    fn scan(
        &self,
        targets: &[ScanTarget],
    ) -> impl Future<Output = Result<Vec<SecurityAlert>, ProviderError>> + Send;

    /// provider 원본 심각도를 정규화합니다. 알 수 없는 값은 medium입니다.
    fn normalize_severity(&self, raw: &str) -> Severity {
        match raw.trim().to_lowercase().as_str() {
            "info" | "informational" => Severity::Low,
            other => Severity::from_str_loose(other).unwrap_or_default(),
        }
    }

    /// 원본 응답에서 수정 버전을 추출합니다.
    fn extract_patched_version(&self, finding: &Self::Finding) -> Option<String>;

    /// 원본 응답 항목을 정규화된 알림으로 변환합니다.
    fn to_alert(&self, finding: &Self::Finding) -> SecurityAlert;
}

/// 구성된 provider (정적 디스패치)
pub enum Provider {
    Offline(OfflineProvider),
    Github(GithubProvider),
    Snyk(SnykProvider),
    NpmAudit(NpmAuditProvider),
    /// 미리 정해진 알림을 반환하는 provider
    Static(StaticProvider),
}

impl Provider {
    pub fn id(&self) -> &str {
        match self {
            Self::Offline(p) => p.id(),
            Self::Github(p) => p.id(),
            Self::Snyk(p) => p.id(),
            Self::NpmAudit(p) => p.id(),
            Self::Static(p) => p.id(),
        }
    }

    pub async fn scan(&self, targets: &[ScanTarget]) -> Result<Vec<SecurityAlert>, ProviderError> {
        match self {
            Self::Offline(p) => p.scan(targets).await,
            Self::Github(p) => p.scan(targets).await,
            Self::Snyk(p) => p.scan(targets).await,
            Self::NpmAudit(p) => p.scan(targets).await,
            Self::Static(p) => p.scan(targets).await,
        }
    }
}

/// 실행 순서가 정해진 provider 목록
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정에서 provider를 구성합니다.
    ///
    /// 토큰은 설정 값이 우선하고, 없으면 `GITHUB_TOKEN` / `SNYK_TOKEN` 환경변수를 사용합니다.
    /// 외부 CLI provider는 `root_dir`에서 실행됩니다.
    ///
    /// # Note
    ///
    /// offline provider가 로컬 권고 DB를 읽으므로 동기 I/O를 수행합니다.
    pub fn from_config(config: &SecurityConfig, root_dir: &Path) -> Result<Self, SecurityError> {
        let mut registry = Self::new();
        for provider in &config.providers {
            let token = provider.token.clone().filter(|t| !t.is_empty());
            let built = match provider.id.as_str() {
                offline::PROVIDER_ID => {
                    let db = match &config.vuln_db_path {
                        Some(dir) => OfflineProvider::with_local_db(Path::new(dir))?,
                        None => OfflineProvider::bundled()?,
                    };
                    Provider::Offline(db)
                }
                github::PROVIDER_ID => Provider::Github(GithubProvider::new(
                    token.or_else(|| env_token(github::TOKEN_ENV)),
                )?),
                snyk::PROVIDER_ID => Provider::Snyk(SnykProvider::new(root_dir, token)),
                npm_audit::PROVIDER_ID => Provider::NpmAudit(NpmAuditProvider::new(root_dir)),
                other => {
                    return Err(SecurityError::UnknownProvider {
                        id: other.to_owned(),
                    });
                }
            };
            registry.push(built);
        }
        tracing::debug!(providers = ?registry.ids(), "security providers configured");
        Ok(registry)
    }

    pub fn push(&mut self, provider: Provider) {
        self.providers.push(Arc::new(provider));
    }

    pub fn providers(&self) -> &[Arc<Provider>] {
        &self.providers
    }

    pub fn ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl FromIterator<Provider> for ProviderRegistry {
    fn from_iter<I: IntoIterator<Item = Provider>>(iter: I) -> Self {
        Self {
            providers: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

fn env_token(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// 미리 정해진 알림을 반환하는 provider
///
/// 네트워크나 외부 CLI 없이 집계 경로를 실행할 때 사용합니다.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    id: String,
    alerts: Vec<SecurityAlert>,
    delay: Option<Duration>,
    fail: bool,
}

impl StaticProvider {
    pub fn new(id: impl Into<String>, alerts: Vec<SecurityAlert>) -> Self {
        Self {
            id: id.into(),
            alerts,
            delay: None,
            fail: false,
        }
    }

    /// 응답 전 지연을 설정합니다.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 항상 비정상 종료로 실패하게 합니다.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl SecurityProvider for StaticProvider {
    type Finding = SecurityAlert;

    fn id(&self) -> &str {
        &self.id
    }

    async fn scan(&self, targets: &[ScanTarget]) -> Result<Vec<SecurityAlert>, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ProviderError::NonZeroExit {
                provider: self.id.clone(),
                code: Some(2),
                stderr: "scripted failure".to_owned(),
            });
        }
        Ok(self
            .alerts
            .iter()
            .filter(|a| targets.iter().any(|t| t.name == a.package_name))
            .map(|a| self.to_alert(a))
            .collect())
    }

    fn extract_patched_version(&self, finding: &SecurityAlert) -> Option<String> {
        finding.patched_version.clone()
    }

    fn to_alert(&self, finding: &SecurityAlert) -> SecurityAlert {
        let patched_version = self.extract_patched_version(finding);
        SecurityAlert {
            fix_available: patched_version.is_some(),
            patched_version,
            provider: self.id.clone(),
            ..finding.clone()
        }
    }
}

/// 테스트용 알림 생성 헬퍼
#[cfg(test)]
pub(crate) fn test_alert(
    package: &str,
    version: &str,
    cve: &str,
    severity: Severity,
    patched: Option<&str>,
) -> SecurityAlert {
    SecurityAlert {
        package_name: package.to_owned(),
        current_version: version.to_owned(),
        severity,
        title: format!("issue {cve}"),
        description: String::new(),
        cve: Some(cve.to_owned()),
        patched_version: patched.map(str::to_owned),
        vulnerable_versions: String::new(),
        fix_available: patched.is_some(),
        url: String::new(),
        provider: String::new(),
        corroborated_by: Vec::new(),
    }
}
