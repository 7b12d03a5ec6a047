//! 메트릭 상수
//!
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//! recorder가 설치되지 않으면 기록은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `pinkeeper_`
//! - 접미어: `_total` (counter), 없음 (gauge)

/// provider 레이블 키
pub const LABEL_PROVIDER: &str = "provider";

/// 심각도 레이블 키 (low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 결과 레이블 키 (success, unavailable, failure)
pub const LABEL_RESULT: &str = "result";

/// 로드된 manifest 수 (gauge)
pub const MANIFESTS_LOADED: &str = "pinkeeper_manifests_loaded";

/// 삭제된 orphan override 수 (counter)
pub const ORPHANS_REMOVED_TOTAL: &str = "pinkeeper_orphans_removed_total";

/// provider 실행 수 (counter, label: provider, result)
pub const PROVIDER_RUNS_TOTAL: &str = "pinkeeper_provider_runs_total";

/// 집계 후 남은 알림 수 (counter, label: severity)
pub const ALERTS_TOTAL: &str = "pinkeeper_alerts_total";

/// 기록된 manifest 수 (counter)
pub const MANIFESTS_WRITTEN_TOTAL: &str = "pinkeeper_manifests_written_total";

/// 메트릭 설명을 등록합니다.
pub fn describe_all() {
    metrics::describe_gauge!(MANIFESTS_LOADED, "Number of manifests loaded in the last run");
    metrics::describe_counter!(ORPHANS_REMOVED_TOTAL, "Orphaned overrides removed");
    metrics::describe_counter!(PROVIDER_RUNS_TOTAL, "Security provider invocations");
    metrics::describe_counter!(ALERTS_TOTAL, "Security alerts surviving aggregation");
    metrics::describe_counter!(MANIFESTS_WRITTEN_TOTAL, "Manifests rewritten on disk");
}
