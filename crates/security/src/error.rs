//! 보안 크레이트 에러 타입
//!
//! [`SecurityError`]는 provider 구성, 권고 DB 로딩, 패치 계획 과정의 에러를 나타냅니다.
//! provider 실행 중 발생하는 에러는 [`ProviderError`]로 표현되며
//! 집계기에서 "알림 0건"으로 강등되므로 여기까지 전파되지 않습니다.

use pinkeeper_core::error::{ConfigError, PinkeeperError, ProviderError};
use pinkeeper_manifest::ManifestError;

/// 보안 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// provider 에러
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// 알 수 없는 provider 식별자
    #[error("unknown security provider '{id}'")]
    UnknownProvider { id: String },

    /// 권고 DB 로딩 실패
    #[error("advisory db load error: {path}: {reason}")]
    AdvisoryDbLoad { path: String, reason: String },

    /// 권고 DB 파싱 실패
    #[error("advisory db parse error: {0}")]
    AdvisoryDbParse(String),

    /// manifest 에러 (override 파싱 등)
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// 사용자가 확인 중 실행을 취소함
    #[error("cancelled during confirmation")]
    Cancelled,
}

impl From<SecurityError> for PinkeeperError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Provider(e) => PinkeeperError::Provider(e),
            SecurityError::UnknownProvider { id } => PinkeeperError::Config(ConfigError::InvalidValue {
                field: "security.providers".to_owned(),
                reason: format!("unknown provider '{id}'"),
            }),
            SecurityError::AdvisoryDbLoad { path, reason } => {
                PinkeeperError::Config(ConfigError::InvalidValue {
                    field: "security.vuln_db_path".to_owned(),
                    reason: format!("{path}: {reason}"),
                })
            }
            SecurityError::AdvisoryDbParse(reason) => {
                PinkeeperError::Config(ConfigError::InvalidValue {
                    field: "security.vuln_db_path".to_owned(),
                    reason,
                })
            }
            SecurityError::Manifest(e) => e.into(),
            SecurityError::Cancelled => PinkeeperError::Cancelled,
        }
    }
}
