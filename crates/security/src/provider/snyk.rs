//! snyk provider -- `snyk test --json` 결과 파싱
//!
//! 종료 코드 0(취약점 없음)과 1(취약점 발견)은 모두 JSON을 출력합니다.
//! 2 이상은 실행 실패로 처리합니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pinkeeper_core::error::ProviderError;
use pinkeeper_core::types::{ScanTarget, SecurityAlert};
use serde::Deserialize;
use serde_json::Value;

use super::SecurityProvider;
use super::process::JsonCommand;

pub const PROVIDER_ID: &str = "snyk";
pub const TOKEN_ENV: &str = "SNYK_TOKEN";
const BINARY: &str = "snyk";

/// snyk 취약점 항목
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnykVulnerability {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    pub package_name: String,
    pub version: String,
    #[serde(default)]
    pub identifiers: SnykIdentifiers,
    #[serde(default)]
    pub fixed_in: Vec<String>,
    /// `[false, "parent@1.0.0", "pkg@1.2.3"]` 형식
    #[serde(default)]
    pub upgrade_path: Vec<Value>,
    #[serde(default)]
    pub semver: SnykSemver,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnykIdentifiers {
    #[serde(default, rename = "CVE")]
    pub cve: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnykSemver {
    #[serde(default)]
    pub vulnerable: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SnykProject {
    #[serde(default)]
    vulnerabilities: Vec<SnykVulnerability>,
}

/// `snyk test` 출력을 취약점 목록으로 파싱합니다.
///
/// 단일 프로젝트 객체와 `--all-projects`의 배열 형식을 모두 받습니다.
pub fn parse_report(value: Value) -> Result<Vec<SnykVulnerability>, ProviderError> {
    let invalid = |e: serde_json::Error| ProviderError::InvalidResponse {
        provider: PROVIDER_ID.to_owned(),
        reason: e.to_string(),
    };
    let projects: Vec<SnykProject> = match value {
        Value::Array(_) => serde_json::from_value(value).map_err(invalid)?,
        Value::Object(ref obj) if obj.contains_key("error") && !obj.contains_key("vulnerabilities") => {
            return Err(ProviderError::InvalidResponse {
                provider: PROVIDER_ID.to_owned(),
                reason: obj["error"].as_str().unwrap_or("unknown error").to_owned(),
            });
        }
        other => vec![serde_json::from_value(other).map_err(invalid)?],
    };
    Ok(projects.into_iter().flat_map(|p| p.vulnerabilities).collect())
}

/// snyk CLI provider
pub struct SnykProvider {
    dir: PathBuf,
    token: Option<String>,
}

impl SnykProvider {
    pub fn new(dir: &Path, token: Option<String>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            token,
        }
    }
}

impl SecurityProvider for SnykProvider {
    type Finding = SnykVulnerability;

    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn scan(&self, targets: &[ScanTarget]) -> Result<Vec<SecurityAlert>, ProviderError> {
        let envs = self
            .token
            .iter()
            .map(|t| (TOKEN_ENV, t.clone()))
            .collect();
        let report = JsonCommand {
            provider: PROVIDER_ID,
            binary: BINARY,
            args: &["test", "--json"],
            dir: &self.dir,
            envs,
            data_exit_codes: &[0, 1],
        }
        .run()
        .await?;

        let wanted: HashSet<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        let mut seen = HashSet::new();
        Ok(parse_report(report)?
            .into_iter()
            .filter(|v| wanted.contains(v.package_name.as_str()))
            .filter(|v| seen.insert((v.id.clone(), v.package_name.clone(), v.version.clone())))
            .map(|v| self.to_alert(&v))
            .collect())
    }

    /// `fixedIn`의 첫 버전, 없으면 업그레이드 경로 마지막 항목의 버전
    fn extract_patched_version(&self, finding: &SnykVulnerability) -> Option<String> {
        if let Some(fixed) = finding.fixed_in.first() {
            return Some(fixed.clone());
        }
        finding
            .upgrade_path
            .last()
            .and_then(Value::as_str)
            .and_then(|spec| version_of_spec(spec))
    }

    fn to_alert(&self, finding: &SnykVulnerability) -> SecurityAlert {
        let patched_version = self.extract_patched_version(finding);
        SecurityAlert {
            package_name: finding.package_name.clone(),
            current_version: finding.version.clone(),
            severity: self.normalize_severity(&finding.severity),
            title: finding.title.clone(),
            description: finding.description.clone(),
            cve: finding.identifiers.cve.first().cloned(),
            fix_available: patched_version.is_some(),
            patched_version,
            vulnerable_versions: finding.semver.vulnerable.join(" || "),
            url: format!("https://security.snyk.io/vuln/{}", finding.id),
            provider: PROVIDER_ID.to_owned(),
            corroborated_by: Vec::new(),
        }
    }
}

/// `name@version` 또는 `@scope/name@version`에서 버전을 꺼냅니다.
fn version_of_spec(spec: &str) -> Option<String> {
    let at = spec.rfind('@').filter(|&idx| idx > 0)?;
    let version = &spec[at + 1..];
    (!version.is_empty()).then(|| version.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinkeeper_core::types::Severity;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "ok": false,
            "vulnerabilities": [
                {
                    "id": "SNYK-JS-LODASH-1040724",
                    "title": "Command Injection",
                    "severity": "high",
                    "packageName": "lodash",
                    "version": "4.17.15",
                    "identifiers": { "CVE": ["CVE-2021-23337"], "CWE": ["CWE-78"] },
                    "fixedIn": ["4.17.21"],
                    "upgradePath": [false, "lodash@4.17.21"],
                    "semver": { "vulnerable": ["<4.17.21"] }
                },
                {
                    "id": "SNYK-JS-MINIMIST-2429795",
                    "title": "Prototype Pollution",
                    "severity": "medium",
                    "packageName": "minimist",
                    "version": "1.2.5",
                    "identifiers": { "CVE": [] },
                    "fixedIn": [],
                    "upgradePath": [false, "mkdirp@0.5.6", "minimist@1.2.6"]
                }
            ]
        })
    }

    #[test]
    fn parses_single_project_report() {
        let vulns = parse_report(sample()).unwrap();
        assert_eq!(vulns.len(), 2);
        assert_eq!(vulns[0].identifiers.cve, vec!["CVE-2021-23337"]);
    }

    #[test]
    fn parses_all_projects_array() {
        let vulns = parse_report(json!([sample(), { "vulnerabilities": [] }])).unwrap();
        assert_eq!(vulns.len(), 2);
    }

    #[test]
    fn error_object_is_invalid_response() {
        let err = parse_report(json!({ "ok": false, "error": "Missing node_modules folder" }))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn patched_version_prefers_fixed_in() {
        let provider = SnykProvider::new(Path::new("."), None);
        let vulns = parse_report(sample()).unwrap();

        let lodash = provider.to_alert(&vulns[0]);
        assert_eq!(lodash.patched_version.as_deref(), Some("4.17.21"));
        assert_eq!(lodash.cve.as_deref(), Some("CVE-2021-23337"));
        assert_eq!(lodash.severity, Severity::High);
        assert_eq!(lodash.vulnerable_versions, "<4.17.21");

        let minimist = provider.to_alert(&vulns[1]);
        assert_eq!(minimist.patched_version.as_deref(), Some("1.2.6"));
        assert_eq!(minimist.cve, None);
        assert_eq!(minimist.severity, Severity::Medium);
    }

    #[test]
    fn version_of_scoped_spec() {
        assert_eq!(version_of_spec("@babel/core@7.22.0").as_deref(), Some("7.22.0"));
        assert_eq!(version_of_spec("qs@6.10.3").as_deref(), Some("6.10.3"));
        assert_eq!(version_of_spec("@scope/name"), None);
        assert_eq!(version_of_spec("bare"), None);
    }
}
