//! 에러 타입 — 도메인별 에러 정의
//!
//! # 에러 분류
//!
//! - [`ConfigError`]: 읽을 수 없거나 파싱할 수 없는 manifest, 잘못된 glob. 쓰기 전에 실행 전체를 중단합니다.
//! - [`ProviderError`]: 네트워크 실패, 토큰 누락, CLI 비정상 종료. 해당 provider만 0건으로 강등됩니다.
//! - [`ReconciliationError`]: 한 manifest 안의 override 메커니즘 충돌. 해당 manifest만 실패합니다.
//! - [`WriteError`]: 파일 시스템 에러. 해당 manifest의 쓰기 트랜잭션만 중단됩니다.

/// Pinkeeper 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum PinkeeperError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 보안 provider 에러
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// 조정(reconciliation) 에러
    #[error("reconciliation error: {0}")]
    Reconciliation(#[from] ReconciliationError),

    /// manifest 쓰기 에러
    #[error("write error: {0}")]
    Write(#[from] WriteError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 사용자가 실행을 취소함
    #[error("run cancelled before any manifest was written")]
    Cancelled,
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 유효하지 않은 workspace glob
    #[error("invalid workspace glob '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    /// manifest를 읽을 수 없음
    #[error("cannot read manifest {path}: {reason}")]
    ManifestUnreadable { path: String, reason: String },

    /// manifest 파싱 실패
    #[error("cannot parse manifest {path}: {reason}")]
    ManifestParse { path: String, reason: String },
}

/// 보안 provider 에러
///
/// 모든 variant는 복구 가능합니다. 집계기는 이 에러를 받은 provider를
/// "알림 0건"으로 처리하고 나머지 provider의 결과로 계속 진행합니다.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// 외부 실행 파일이 PATH에 없음
    #[error("{provider}: executable '{binary}' not found")]
    MissingBinary { provider: String, binary: String },

    /// 필요한 인증 토큰이 없음
    #[error("{provider}: no access token configured")]
    MissingToken { provider: String },

    /// 외부 프로세스가 데이터 없이 비정상 종료함
    #[error("{provider}: exited with status {code:?}: {stderr}")]
    NonZeroExit {
        provider: String,
        code: Option<i32>,
        stderr: String,
    },

    /// provider별 타임아웃 초과
    #[error("{provider}: timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// 요청 실패 (네트워크, HTTP 상태)
    #[error("{provider}: request failed: {reason}")]
    Request { provider: String, reason: String },

    /// 응답 형식이 예상과 다름
    #[error("{provider}: invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl ProviderError {
    /// 에러를 발생시킨 provider 식별자를 반환합니다.
    pub fn provider(&self) -> &str {
        match self {
            Self::MissingBinary { provider, .. }
            | Self::MissingToken { provider }
            | Self::NonZeroExit { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Request { provider, .. }
            | Self::InvalidResponse { provider, .. } => provider,
        }
    }

    /// provider를 사용할 수 없는 상태(바이너리/토큰 누락, 비정상 종료, 타임아웃)인지 반환합니다.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::MissingBinary { .. }
                | Self::MissingToken { .. }
                | Self::NonZeroExit { .. }
                | Self::Timeout { .. }
        )
    }
}

/// 조정(reconciliation) 에러
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    /// 같은 패키지가 서로 다른 메커니즘에서 다른 버전으로 고정됨
    #[error(
        "{manifest}: '{package}' is pinned to {first_version} via {first} and to {second_version} via {second}"
    )]
    ConflictingMechanisms {
        manifest: String,
        package: String,
        first: String,
        first_version: String,
        second: String,
        second_version: String,
    },

    /// override 필드의 값이 문자열/객체가 아님
    #[error("{manifest}: invalid {field} entry '{key}': {reason}")]
    InvalidOverride {
        manifest: String,
        field: String,
        key: String,
        reason: String,
    },
}

/// manifest 쓰기 에러
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// 직렬화 실패
    #[error("cannot serialize {path}: {reason}")]
    Serialize { path: String, reason: String },

    /// 임시 파일 생성 또는 기록 실패
    #[error("cannot stage {path}: {source}")]
    Stage {
        path: String,
        source: std::io::Error,
    },

    /// 임시 파일을 최종 경로로 교체하지 못함
    #[error("cannot replace {path}: {source}")]
    Persist {
        path: String,
        source: std::io::Error,
    },
}
