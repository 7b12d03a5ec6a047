//! 도메인 타입 — 모든 크레이트가 공유하는 핵심 데이터 구조

use std::fmt;

use serde::{Deserialize, Serialize};

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    #[default]
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다. 알 수 없는 값은 `None`을 반환합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 소문자 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// override 메커니즘 (패키지 관리자별 필드)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum OverrideMechanism {
    /// npm / bun `overrides`
    Overrides,
    /// yarn / bun `resolutions`
    Resolutions,
    /// pnpm `pnpm.overrides`
    PnpmOverrides,
}

impl OverrideMechanism {
    /// 탐색 우선순위 순서의 전체 메커니즘 목록
    pub const ALL: [Self; 3] = [Self::Overrides, Self::Resolutions, Self::PnpmOverrides];

    /// manifest 내 필드 경로를 반환합니다.
    pub fn field_path(&self) -> &'static [&'static str] {
        match self {
            Self::Overrides => &["overrides"],
            Self::Resolutions => &["resolutions"],
            Self::PnpmOverrides => &["pnpm", "overrides"],
        }
    }
}

impl fmt::Display for OverrideMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overrides => write!(f, "overrides"),
            Self::Resolutions => write!(f, "resolutions"),
            Self::PnpmOverrides => write!(f, "pnpm.overrides"),
        }
    }
}

/// 보안 스캔 대상 (`name@version`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScanTarget {
    /// 패키지 이름
    pub name: String,
    /// 현재 버전 (구체적인 버전 문자열)
    pub version: String,
}

impl ScanTarget {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// 권고 URL 마지막 경로 세그먼트의 GHSA 식별자
///
/// `https://github.com/advisories/GHSA-xvch-5gv4-984h` → `GHSA-xvch-5gv4-984h`
pub fn ghsa_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    let groups: Vec<&str> = last.strip_prefix("GHSA-")?.split('-').collect();
    let valid = groups.len() == 3
        && groups
            .iter()
            .all(|g| g.len() == 4 && g.bytes().all(|b| b.is_ascii_alphanumeric()));
    valid.then_some(last)
}

/// 보안 알림
///
/// provider별 응답 형식을 정규화한 단일 표현입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    /// 패키지 이름
    pub package_name: String,
    /// 현재 버전
    pub current_version: String,
    /// 심각도
    pub severity: Severity,
    /// 제목
    pub title: String,
    /// 상세 설명
    pub description: String,
    /// CVE 식별자 (있을 경우)
    pub cve: Option<String>,
    /// 수정된 버전 (있을 경우)
    pub patched_version: Option<String>,
    /// 취약 버전 범위
    pub vulnerable_versions: String,
    /// 수정 가능 여부
    pub fix_available: bool,
    /// 권고 URL
    pub url: String,
    /// 알림을 생성한 provider
    pub provider: String,
    /// 같은 알림을 보고한 다른 provider 목록
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corroborated_by: Vec<String>,
}

impl SecurityAlert {
    /// 같은 권고를 가리키는 식별자 목록
    ///
    /// CVE 필드와 URL의 GHSA 식별자를 모두 포함합니다. 둘 다 없으면 제목을 씁니다.
    pub fn aliases(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.cve.as_deref().into_iter().collect();
        if let Some(ghsa) = ghsa_from_url(&self.url)
            && !out.contains(&ghsa)
        {
            out.push(ghsa);
        }
        if out.is_empty() {
            out.push(&self.title);
        }
        out
    }

    /// 같은 패키지 버전에 대한 같은 권고인지 여부
    ///
    /// provider마다 CVE 또는 GHSA 중 하나만 줄 수 있으므로 식별자가 하나라도 겹치면 같습니다.
    pub fn same_advisory(&self, other: &SecurityAlert) -> bool {
        self.package_name == other.package_name
            && self.current_version == other.current_version
            && {
                let theirs = other.aliases();
                self.aliases().iter().any(|a| theirs.contains(a))
            }
    }

    /// 권고 식별자 (CVE가 있으면 CVE, 없으면 제목)
    pub fn advisory_id(&self) -> &str {
        self.cve.as_deref().unwrap_or(&self.title)
    }
}

impl fmt::Display for SecurityAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}@{}: {}",
            self.severity,
            self.package_name,
            self.current_version,
            self.advisory_id(),
        )
    }
}
