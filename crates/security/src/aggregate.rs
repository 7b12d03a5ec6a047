//! 보안 알림 집계
//!
//! [`Aggregator`]는 구성된 모든 provider를 동시에 실행합니다.
//!
//! 1. provider마다 독립된 타임아웃을 적용합니다. 실패와 타임아웃은 해당 provider의 0건으로 처리됩니다.
//! 2. 같은 패키지 버전에서 CVE 또는 GHSA 식별자가 겹치는 알림을 하나로 합칩니다.
//!    수정 버전이 가장 높은 알림을 남기고, 나머지 provider는 `corroborated_by`에 기록합니다.
//! 3. 심각도 임계값 미만을 제거합니다.
//! 4. 심각도 내림차순, 패키지 이름 오름차순으로 정렬합니다.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pinkeeper_core::error::ProviderError;
use pinkeeper_core::metrics as m;
use pinkeeper_core::types::{ScanTarget, SecurityAlert, Severity};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::provider::ProviderRegistry;
use crate::version;

/// provider 한 개의 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderStatus {
    /// 정상 완료
    Ok { alerts: usize },
    /// 바이너리/토큰 누락, 비정상 종료, 타임아웃
    Unavailable { reason: String },
    /// 요청 실패 또는 응답 형식 오류
    Failed { reason: String },
}

impl ProviderStatus {
    fn from_error(err: &ProviderError) -> Self {
        if err.is_unavailable() {
            Self::Unavailable {
                reason: err.to_string(),
            }
        } else {
            Self::Failed {
                reason: err.to_string(),
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok { .. } => "ok",
            Self::Unavailable { .. } => "unavailable",
            Self::Failed { .. } => "failed",
        }
    }
}

/// provider별 실행 기록
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutcome {
    pub provider: String,
    #[serde(flatten)]
    pub status: ProviderStatus,
    pub elapsed_ms: u64,
}

/// 집계 결과
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    /// 중복 제거, 필터링, 정렬된 알림
    pub alerts: Vec<SecurityAlert>,
    /// provider 실행 순서대로의 결과
    pub outcomes: Vec<ProviderOutcome>,
    /// 정상 완료된 provider 수
    pub providers_succeeded: usize,
    /// 임계값 미만으로 제거된 알림 수
    pub below_threshold: usize,
}

impl AggregateReport {
    /// 하나 이상의 provider가 응답했는지 반환합니다.
    ///
    /// 모든 provider가 실패하면 "취약점 없음"과 구분해야 합니다.
    pub fn has_data(&self) -> bool {
        self.providers_succeeded > 0
    }
}

/// 알림 집계기
#[derive(Debug, Clone)]
pub struct Aggregator {
    timeout: Duration,
    threshold: Severity,
}

impl Aggregator {
    pub fn new(timeout: Duration, threshold: Severity) -> Self {
        Self { timeout, threshold }
    }

    /// 모든 provider를 동시에 실행하고 결과를 병합합니다.
    pub async fn run(&self, registry: &ProviderRegistry, targets: Vec<ScanTarget>) -> AggregateReport {
        let targets: Arc<[ScanTarget]> = targets.into();
        let mut set = JoinSet::new();

        for (idx, provider) in registry.providers().iter().enumerate() {
            let provider = Arc::clone(provider);
            let targets = Arc::clone(&targets);
            let timeout = self.timeout;
            set.spawn(async move {
                let started = Instant::now();
                let result = match tokio::time::timeout(timeout, provider.scan(&targets)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout {
                        provider: provider.id().to_owned(),
                        secs: timeout.as_secs(),
                    }),
                };
                (idx, provider.id().to_owned(), result, started.elapsed())
            });
        }

        let mut results: Vec<(usize, String, Result<Vec<SecurityAlert>, ProviderError>, Duration)> =
            Vec::with_capacity(registry.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(r) => results.push(r),
                Err(e) => warn!(error = %e, "security provider task failed"),
            }
        }
        // 병합 결과가 완료 순서에 의존하지 않도록 구성 순서로 정렬
        results.sort_by_key(|(idx, ..)| *idx);

        let mut outcomes = Vec::with_capacity(results.len());
        let mut per_provider = Vec::with_capacity(results.len());
        for (_, provider, result, elapsed) in results {
            let status = match result {
                Ok(alerts) => {
                    let status = ProviderStatus::Ok {
                        alerts: alerts.len(),
                    };
                    per_provider.push(alerts);
                    status
                }
                Err(e) => {
                    warn!(provider = %provider, error = %e, "security provider yielded no data");
                    ProviderStatus::from_error(&e)
                }
            };
            metrics::counter!(
                m::PROVIDER_RUNS_TOTAL,
                m::LABEL_PROVIDER => provider.clone(),
                m::LABEL_RESULT => status.label()
            )
            .increment(1);
            outcomes.push(ProviderOutcome {
                provider,
                status,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let providers_succeeded = per_provider.len();
        let (alerts, below_threshold) = merge(per_provider, self.threshold);
        for alert in &alerts {
            metrics::counter!(m::ALERTS_TOTAL, m::LABEL_SEVERITY => alert.severity.as_str())
                .increment(1);
        }

        info!(
            providers = outcomes.len(),
            succeeded = providers_succeeded,
            alerts = alerts.len(),
            below_threshold,
            "security aggregation complete"
        );

        AggregateReport {
            alerts,
            outcomes,
            providers_succeeded,
            below_threshold,
        }
    }
}

/// provider별 알림 목록을 병합합니다.
///
/// 반환값은 (최종 알림, 임계값 미만으로 제거된 수)입니다.
pub fn merge(per_provider: Vec<Vec<SecurityAlert>>, threshold: Severity) -> (Vec<SecurityAlert>, usize) {
    let mut groups: Vec<Vec<SecurityAlert>> = Vec::new();

    for alert in per_provider.into_iter().flatten() {
        let matching: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, group)| group.iter().any(|a| a.same_advisory(&alert)))
            .map(|(i, _)| i)
            .collect();
        match matching.split_first() {
            None => groups.push(vec![alert]),
            Some((&first, rest)) => {
                // 이 알림이 두 그룹을 잇는 경우 (CVE로 한쪽, GHSA로 다른 쪽)
                for &i in rest.iter().rev() {
                    let absorbed = groups.remove(i);
                    groups[first].extend(absorbed);
                }
                groups[first].push(alert);
            }
        }
    }

    let mut merged: Vec<SecurityAlert> = groups.into_iter().map(collapse).collect();

    let before = merged.len();
    merged.retain(|a| a.severity >= threshold);
    let below = before - merged.len();

    merged.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.package_name.cmp(&b.package_name))
            .then_with(|| a.current_version.cmp(&b.current_version))
            .then_with(|| a.advisory_id().cmp(b.advisory_id()))
    });
    (merged, below)
}

/// 같은 권고의 중복 알림을 하나로 합칩니다. `group`은 비어 있지 않습니다.
///
/// 수정 버전이 가장 높은 알림을 남기고 (같으면 먼저 온 알림), 심각도는 가장 높은 값을 씁니다.
/// 남긴 알림에 CVE가 없으면 다른 알림의 CVE를 가져옵니다.
fn collapse(mut group: Vec<SecurityAlert>) -> SecurityAlert {
    let mut keep = 0;
    for (i, alert) in group.iter().enumerate() {
        let Some(candidate) = alert.patched_version.as_deref() else {
            continue;
        };
        match group[keep].patched_version.as_deref() {
            Some(best) if version::compare(candidate, best) != Ordering::Greater => {}
            _ => keep = i,
        }
    }
    let severity = group.iter().map(|a| a.severity).max().unwrap_or_default();
    let cve = group
        .iter()
        .filter_map(|a| a.cve.as_deref())
        .find(|id| id.starts_with("CVE-"))
        .map(str::to_owned);

    let mut kept = group.remove(keep);
    kept.severity = severity;
    if !kept.cve.as_deref().is_some_and(|id| id.starts_with("CVE-")) && cve.is_some() {
        kept.cve = cve;
    }
    for alert in group {
        for provider in std::iter::once(alert.provider).chain(alert.corroborated_by) {
            if provider != kept.provider && !kept.corroborated_by.contains(&provider) {
                kept.corroborated_by.push(provider);
            }
        }
    }
    kept
}
