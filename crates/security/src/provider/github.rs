//! github provider -- GitHub global security advisories REST API
//!
//! `GET /advisories?ecosystem=npm&affects=name@version,...`로 대상 묶음을 조회하고
//! `Link` 헤더의 다음 페이지를 따라갑니다.
//! 토큰이 없으면 요청 없이 [`ProviderError::MissingToken`]을 반환합니다.

use std::collections::HashSet;

use pinkeeper_core::error::ProviderError;
use pinkeeper_core::types::{ScanTarget, SecurityAlert};
use serde::Deserialize;

use super::SecurityProvider;

pub const PROVIDER_ID: &str = "github";
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";
const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

/// 요청 한 번에 담는 대상 수
const TARGETS_PER_REQUEST: usize = 50;
const PER_PAGE: &str = "100";
/// 대상 묶음 하나에 대해 따라가는 최대 페이지 수
const MAX_PAGES: usize = 20;

/// 전역 권고 항목
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalAdvisory {
    pub ghsa_id: String,
    #[serde(default)]
    pub cve_id: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub vulnerabilities: Vec<AdvisoryVulnerability>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisoryVulnerability {
    pub package: AdvisoryPackage,
    #[serde(default)]
    pub vulnerable_version_range: Option<String>,
    #[serde(default)]
    pub first_patched_version: Option<PatchedVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisoryPackage {
    #[serde(default)]
    pub ecosystem: String,
    pub name: String,
}

/// 전역 권고 API는 문자열, 저장소 권고 API는 `{ "identifier": .. }` 객체를 씁니다.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PatchedVersion {
    Plain(String),
    Identified { identifier: String },
}

impl PatchedVersion {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(v) => v,
            Self::Identified { identifier } => identifier,
        }
    }
}

/// 대상에 매칭된 권고 취약점
#[derive(Debug, Clone)]
pub struct GithubFinding {
    pub advisory: GlobalAdvisory,
    pub vulnerability: AdvisoryVulnerability,
    pub target: ScanTarget,
}

/// GitHub advisory provider
pub struct GithubProvider {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GithubProvider {
    pub fn new(token: Option<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pinkeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER_ID.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_owned(),
            token,
        })
    }

    /// API 기본 URL을 바꿉니다 (GitHub Enterprise 등).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_owned();
        self
    }

    fn get(&self, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// 대상 묶음 하나의 권고를 `Link: rel="next"`를 따라 모두 가져옵니다.
    async fn fetch(&self, token: &str, chunk: &[ScanTarget]) -> Result<Vec<GlobalAdvisory>, ProviderError> {
        let affects = chunk
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut request = self
            .get(&format!("{}/advisories", self.api_url), token)
            .query(&[("ecosystem", "npm"), ("per_page", PER_PAGE), ("affects", affects.as_str())]);

        let mut advisories = Vec::new();
        for page in 1..=MAX_PAGES {
            let response = request.send().await.map_err(|e| request_error(&e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(ProviderError::Request {
                    provider: PROVIDER_ID.to_owned(),
                    reason: format!("HTTP {status}"),
                });
            }

            let next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);
            let mut batch = response
                .json::<Vec<GlobalAdvisory>>()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: PROVIDER_ID.to_owned(),
                    reason: e.to_string(),
                })?;
            tracing::trace!(page, advisories = batch.len(), "github advisory page");
            advisories.append(&mut batch);

            match next {
                Some(url) => request = self.get(&url, token),
                None => return Ok(advisories),
            }
        }

        tracing::warn!(
            pages = MAX_PAGES,
            targets = chunk.len(),
            "github advisory page limit reached, remaining pages skipped"
        );
        Ok(advisories)
    }
}

/// `Link` 헤더에서 `rel="next"` URL을 찾습니다.
///
/// URL 안의 쉼표에 영향을 받지 않도록 `<...>` 구간 단위로 읽습니다.
pub fn next_link(header: &str) -> Option<String> {
    let mut rest = header;
    while let Some(open) = rest.find('<') {
        let close = open + rest[open..].find('>')?;
        let url = &rest[open + 1..close];
        let params_end = rest[close..].find('<').map_or(rest.len(), |i| close + i);
        let is_next = rest[close + 1..params_end]
            .split([';', ','])
            .any(|p| matches!(p.trim(), "rel=\"next\"" | "rel=next"));
        if is_next {
            return Some(url.to_owned());
        }
        rest = &rest[params_end..];
    }
    None
}

fn request_error(e: &reqwest::Error) -> ProviderError {
    ProviderError::Request {
        provider: PROVIDER_ID.to_owned(),
        reason: e.to_string(),
    }
}

/// 응답 권고를 대상별로 펼칩니다. npm 생태계가 아닌 항목은 무시합니다.
pub fn match_targets(advisories: &[GlobalAdvisory], targets: &[ScanTarget]) -> Vec<GithubFinding> {
    let mut out = Vec::new();
    for advisory in advisories {
        for vulnerability in &advisory.vulnerabilities {
            if !vulnerability.package.ecosystem.is_empty()
                && !vulnerability.package.ecosystem.eq_ignore_ascii_case("npm")
            {
                continue;
            }
            for target in targets.iter().filter(|t| t.name == vulnerability.package.name) {
                out.push(GithubFinding {
                    advisory: advisory.clone(),
                    vulnerability: vulnerability.clone(),
                    target: target.clone(),
                });
            }
        }
    }
    out
}

impl SecurityProvider for GithubProvider {
    type Finding = GithubFinding;

    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn scan(&self, targets: &[ScanTarget]) -> Result<Vec<SecurityAlert>, ProviderError> {
        let Some(token) = self.token.as_deref() else {
            return Err(ProviderError::MissingToken {
                provider: PROVIDER_ID.to_owned(),
            });
        };

        let mut seen = HashSet::new();
        let mut alerts = Vec::new();
        for chunk in targets.chunks(TARGETS_PER_REQUEST) {
            let advisories = self.fetch(token, chunk).await?;
            tracing::debug!(
                targets = chunk.len(),
                advisories = advisories.len(),
                "github advisories fetched"
            );
            for finding in match_targets(&advisories, chunk) {
                if seen.insert((finding.advisory.ghsa_id.clone(), finding.target.clone())) {
                    alerts.push(self.to_alert(&finding));
                }
            }
        }
        Ok(alerts)
    }

    fn extract_patched_version(&self, finding: &GithubFinding) -> Option<String> {
        finding
            .vulnerability
            .first_patched_version
            .as_ref()
            .map(|v| v.as_str().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn to_alert(&self, finding: &GithubFinding) -> SecurityAlert {
        let advisory = &finding.advisory;
        let patched_version = self.extract_patched_version(finding);
        SecurityAlert {
            package_name: finding.target.name.clone(),
            current_version: finding.target.version.clone(),
            severity: self.normalize_severity(&advisory.severity),
            title: advisory.summary.clone(),
            description: advisory.description.clone(),
            cve: advisory
                .cve_id
                .clone()
                .or_else(|| Some(advisory.ghsa_id.clone())),
            fix_available: patched_version.is_some(),
            patched_version,
            vulnerable_versions: finding
                .vulnerability
                .vulnerable_version_range
                .clone()
                .unwrap_or_default(),
            url: advisory.html_url.clone(),
            provider: PROVIDER_ID.to_owned(),
            corroborated_by: Vec::new(),
        }
    }
}
