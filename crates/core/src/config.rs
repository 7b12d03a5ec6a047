//! 설정 관리 — pinkeeper.toml 파싱 및 런타임 설정
//!
//! [`PinkeeperConfig`]는 실행 한 번에 필요한 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`PINKEEPER_SECURITY_SEVERITY_THRESHOLD=high` 형식)
//! 3. 설정 파일 (`pinkeeper.toml`)
//! 4. 루트 manifest의 `pinkeeper` 키 (workspace 설정만)
//! 5. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), pinkeeper_core::error::PinkeeperError> {
//! use pinkeeper_core::config::PinkeeperConfig;
//!
//! // 파일이 없으면 기본값 + 환경변수
//! let config = PinkeeperConfig::load_or_default("pinkeeper.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = PinkeeperConfig::parse("[security]\nenabled = true")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, PinkeeperError};
use crate::types::Severity;

/// provider 타임아웃 상한 (초)
const MAX_TIMEOUT_SECS: u64 = 600;

/// 알려진 provider 식별자
pub const KNOWN_PROVIDERS: [&str; 4] = ["offline", "github", "snyk", "npm-audit"];

/// Pinkeeper 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PinkeeperConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// workspace 설정
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// 보안 스캔 설정
    #[serde(default)]
    pub security: SecurityConfig,
    /// 실행 모드
    #[serde(default)]
    pub mode: ModeConfig,
}

impl PinkeeperConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PinkeeperError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일이 없으면 기본값에서 시작합니다.
    ///
    /// 파일이 존재하지만 읽거나 파싱할 수 없으면 에러를 반환합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, PinkeeperError> {
        let path = path.as_ref();
        let mut config = match tokio::fs::try_exists(path).await {
            Ok(true) => Self::from_file(path).await?,
            _ => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PinkeeperError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PinkeeperError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                PinkeeperError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, PinkeeperError> {
        toml::from_str(toml_str).map_err(|e| {
            PinkeeperError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `PINKEEPER_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PINKEEPER_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "PINKEEPER_GENERAL_LOG_FORMAT");

        // Workspace
        override_string(&mut self.workspace.root, "PINKEEPER_WORKSPACE_ROOT");
        override_csv(&mut self.workspace.ignore, "PINKEEPER_WORKSPACE_IGNORE");
        override_bool(
            &mut self.workspace.include_dev,
            "PINKEEPER_WORKSPACE_INCLUDE_DEV",
        );
        if let Ok(val) = std::env::var("PINKEEPER_WORKSPACE_DEP_PATHS") {
            self.workspace.dep_paths = Some(DepPaths::from_csv(&val));
        }

        // Security
        override_bool(&mut self.security.enabled, "PINKEEPER_SECURITY_ENABLED");
        override_string(
            &mut self.security.severity_threshold,
            "PINKEEPER_SECURITY_SEVERITY_THRESHOLD",
        );
        override_u64(
            &mut self.security.timeout_secs,
            "PINKEEPER_SECURITY_TIMEOUT_SECS",
        );
        if let Ok(val) = std::env::var("PINKEEPER_SECURITY_VULN_DB_PATH") {
            self.security.vuln_db_path = Some(val);
        }
        if let Ok(val) = std::env::var("PINKEEPER_SECURITY_PROVIDERS") {
            self.security.set_provider_ids(val.split(',').map(str::trim));
        }

        // Mode
        override_bool(&mut self.mode.interactive, "PINKEEPER_MODE_INTERACTIVE");
        override_bool(&mut self.mode.force, "PINKEEPER_MODE_FORCE");
        override_bool(&mut self.mode.dry_run, "PINKEEPER_MODE_DRY_RUN");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PinkeeperError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.workspace.root.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "workspace.root".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if Severity::from_str_loose(&self.security.severity_threshold).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "security.severity_threshold".to_owned(),
                reason: "must be one of: low, medium, high, critical".to_owned(),
            }
            .into());
        }

        if self.security.timeout_secs == 0 || self.security.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "security.timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_TIMEOUT_SECS}"),
            }
            .into());
        }

        for provider in &self.security.providers {
            if !KNOWN_PROVIDERS.contains(&provider.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "security.providers".to_owned(),
                    reason: format!(
                        "unknown provider '{}' (expected one of: {})",
                        provider.id,
                        KNOWN_PROVIDERS.join(", ")
                    ),
                }
                .into());
            }
        }

        if self.security.enabled && self.security.providers.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "security.providers".to_owned(),
                reason: "at least one provider required when security is enabled".to_owned(),
            }
            .into());
        }

        if self.mode.force && self.mode.interactive {
            return Err(ConfigError::InvalidValue {
                field: "mode".to_owned(),
                reason: "force and interactive are mutually exclusive".to_owned(),
            }
            .into());
        }

        Ok(())
    }

    /// 검증된 심각도 임계값을 반환합니다.
    pub fn severity_threshold(&self) -> Severity {
        Severity::from_str_loose(&self.security.severity_threshold).unwrap_or_default()
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// workspace 경로 지정 방식
///
/// TOML/JSON에서는 `"workspace"` 문자열 또는 glob 배열로 표현합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDepPaths", into = "RawDepPaths")]
pub enum DepPaths {
    /// 루트 manifest의 `workspaces` 선언에서 자동 탐지
    Workspace,
    /// 명시적 glob 목록
    Globs(Vec<String>),
}

impl DepPaths {
    /// `workspace` 또는 쉼표로 구분된 glob 목록을 파싱합니다.
    pub fn from_csv(val: &str) -> Self {
        if val.trim() == "workspace" {
            Self::Workspace
        } else {
            Self::Globs(
                val.split(',')
                    .map(|s| s.trim().to_owned())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawDepPaths {
    Keyword(String),
    List(Vec<String>),
}

impl TryFrom<RawDepPaths> for DepPaths {
    type Error = String;

    fn try_from(raw: RawDepPaths) -> Result<Self, Self::Error> {
        match raw {
            RawDepPaths::Keyword(k) if k == "workspace" => Ok(Self::Workspace),
            RawDepPaths::Keyword(k) => Err(format!(
                "dep_paths must be \"workspace\" or a list of globs, got \"{k}\""
            )),
            RawDepPaths::List(globs) => Ok(Self::Globs(globs)),
        }
    }
}

impl From<DepPaths> for RawDepPaths {
    fn from(value: DepPaths) -> Self {
        match value {
            DepPaths::Workspace => Self::Keyword("workspace".to_owned()),
            DepPaths::Globs(globs) => Self::List(globs),
        }
    }
}

/// workspace 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// 루트 manifest가 있는 디렉토리
    pub root: String,
    /// workspace 지정 (없으면 루트 manifest의 `pinkeeper.depPaths` 또는 루트만)
    pub dep_paths: Option<DepPaths>,
    /// 제외할 glob 목록
    pub ignore: Vec<String>,
    /// devDependencies 포함 여부
    pub include_dev: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: ".".to_owned(),
            dep_paths: None,
            ignore: Vec::new(),
            include_dev: true,
        }
    }
}

/// 단일 provider 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// provider 식별자 (offline, github, snyk, npm-audit)
    pub id: String,
    /// 인증 토큰 (선택)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: None,
        }
    }
}

/// 보안 스캔 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 보안 스캔 활성화 여부
    pub enabled: bool,
    /// 요청된 provider 목록
    pub providers: Vec<ProviderConfig>,
    /// 심각도 임계값 (low, medium, high, critical)
    pub severity_threshold: String,
    /// provider별 타임아웃 (초)
    pub timeout_secs: u64,
    /// offline provider용 추가 권고 DB 디렉토리
    pub vuln_db_path: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            providers: vec![ProviderConfig::new("offline")],
            severity_threshold: "medium".to_owned(),
            timeout_secs: 30,
            vuln_db_path: None,
        }
    }
}

impl SecurityConfig {
    /// provider 목록을 교체합니다. 같은 id에 설정된 토큰은 유지됩니다.
    pub fn set_provider_ids<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let previous = std::mem::take(&mut self.providers);
        for id in ids.into_iter().filter(|id| !id.is_empty()) {
            let token = previous
                .iter()
                .find(|p| p.id == id)
                .and_then(|p| p.token.clone());
            if self.providers.iter().any(|p| p.id == id) {
                continue;
            }
            self.providers.push(ProviderConfig {
                id: id.to_owned(),
                token,
            });
        }
    }
}

/// 실행 모드
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    /// 보안 패치마다 확인을 요청
    pub interactive: bool,
    /// 임계값 이상의 보안 패치를 모두 자동 승인
    pub force: bool,
    /// 계획만 계산하고 manifest는 기록하지 않음
    pub dry_run: bool,
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
