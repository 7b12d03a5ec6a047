//! manifest 크레이트 에러 타입
//!
//! [`ManifestError`]는 manifest 로딩, workspace 확장, 조정, 쓰기 과정의 모든 실패를 나타냅니다.
//! `From<ManifestError> for PinkeeperError` 구현으로 상위 분류
//! (`ConfigError` / `ReconciliationError` / `WriteError`)에 매핑됩니다.

use pinkeeper_core::error::{ConfigError, PinkeeperError, ReconciliationError, WriteError};

/// manifest 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// manifest 파일 읽기 실패
    #[error("cannot read manifest {path}: {source}")]
    Read {
        /// 파일 경로
        path: String,
        /// 원본 I/O 에러
        source: std::io::Error,
    },

    /// manifest JSON 파싱 실패
    #[error("cannot parse manifest {path}: {reason}")]
    Parse {
        /// 파일 경로
        path: String,
        /// 파싱 실패 사유
        reason: String,
    },

    /// 파일 크기 초과
    #[error("manifest too large: {path}: {size} bytes (max: {max})")]
    FileTooBig {
        /// 파일 경로
        path: String,
        /// 실제 크기 (바이트)
        size: u64,
        /// 최대 허용 크기 (바이트)
        max: u64,
    },

    /// workspace glob 컴파일 실패
    #[error("invalid workspace glob '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    /// override 필드의 값 형식이 잘못됨
    #[error("{manifest}: invalid {field} entry '{key}': {reason}")]
    InvalidOverride {
        manifest: String,
        field: String,
        key: String,
        reason: String,
    },

    /// 한 manifest 안에서 메커니즘 간 버전 충돌
    #[error("{0}")]
    Conflict(ReconciliationError),

    /// 렌더링 실패
    #[error("cannot serialize {path}: {reason}")]
    Serialize { path: String, reason: String },

    /// 임시 파일 기록 실패
    #[error("cannot stage {path}: {source}")]
    Stage {
        path: String,
        source: std::io::Error,
    },

    /// 최종 경로 교체 실패
    #[error("cannot replace {path}: {source}")]
    Persist {
        path: String,
        source: std::io::Error,
    },

    /// blocking 작업 join 실패
    #[error("task join error: {0}")]
    Join(String),
}

impl ManifestError {
    /// 해당 manifest만 실패시키는 에러인지 반환합니다.
    pub fn is_per_manifest(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::InvalidOverride { .. } | Self::Stage { .. } | Self::Persist { .. }
        )
    }
}

impl From<ReconciliationError> for ManifestError {
    fn from(err: ReconciliationError) -> Self {
        Self::Conflict(err)
    }
}

impl From<ManifestError> for PinkeeperError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::Read { path, source } => {
                PinkeeperError::Config(ConfigError::ManifestUnreadable {
                    path,
                    reason: source.to_string(),
                })
            }
            ManifestError::Parse { path, reason } => {
                PinkeeperError::Config(ConfigError::ManifestParse { path, reason })
            }
            ManifestError::FileTooBig { path, size, max } => {
                PinkeeperError::Config(ConfigError::ManifestUnreadable {
                    path,
                    reason: format!("{size} bytes exceeds limit of {max}"),
                })
            }
            ManifestError::InvalidGlob { pattern, reason } => {
                PinkeeperError::Config(ConfigError::InvalidGlob { pattern, reason })
            }
            ManifestError::InvalidOverride {
                manifest,
                field,
                key,
                reason,
            } => PinkeeperError::Reconciliation(ReconciliationError::InvalidOverride {
                manifest,
                field,
                key,
                reason,
            }),
            ManifestError::Conflict(inner) => PinkeeperError::Reconciliation(inner),
            ManifestError::Serialize { path, reason } => {
                PinkeeperError::Write(WriteError::Serialize { path, reason })
            }
            ManifestError::Stage { path, source } => {
                PinkeeperError::Write(WriteError::Stage { path, source })
            }
            ManifestError::Persist { path, source } => {
                PinkeeperError::Write(WriteError::Persist { path, source })
            }
            ManifestError::Join(msg) => {
                PinkeeperError::Io(std::io::Error::other(format!("task join error: {msg}")))
            }
        }
    }
}
