//! npm-audit provider -- `npm audit --json` (auditReportVersion 2) 결과 파싱
//!
//! `vulnerabilities.<name>.via`의 객체 항목이 실제 권고입니다.
//! 문자열 항목은 다른 패키지를 경유한 간접 영향이므로 건너뜁니다.
//! 보고서에 CVE가 없으므로 권고 URL의 GHSA 식별자를 `cve`에 담습니다.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use pinkeeper_core::error::ProviderError;
use pinkeeper_core::types::{ScanTarget, SecurityAlert, ghsa_from_url};
use serde::Deserialize;
use serde_json::Value;

use super::SecurityProvider;
use super::process::JsonCommand;
use crate::version;

pub const PROVIDER_ID: &str = "npm-audit";
const BINARY: &str = "npm";

#[derive(Debug, Deserialize)]
struct AuditReport {
    #[serde(default)]
    vulnerabilities: BTreeMap<String, AuditVulnerability>,
}

/// 패키지 하나의 감사 결과
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditVulnerability {
    pub name: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub via: Vec<Value>,
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub fix_available: FixAvailable,
}

/// `fixAvailable`: `true`/`false` 또는 설치할 패키지 정보
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FixAvailable {
    Flag(bool),
    Upgrade { name: String, version: String },
}

impl Default for FixAvailable {
    fn default() -> Self {
        Self::Flag(false)
    }
}

/// `via` 객체 항목 (권고)
#[derive(Debug, Clone, Deserialize)]
pub struct AuditAdvisory {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub range: String,
}

/// 대상에 매칭된 권고
#[derive(Debug, Clone)]
pub struct NpmFinding {
    pub target: ScanTarget,
    pub advisory: AuditAdvisory,
    pub fix: FixAvailable,
}

/// 감사 보고서를 파싱합니다.
pub fn parse_report(value: Value) -> Result<Vec<AuditVulnerability>, ProviderError> {
    if let Some(error) = value.get("error") {
        let summary = error
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("npm audit reported an error");
        return Err(ProviderError::InvalidResponse {
            provider: PROVIDER_ID.to_owned(),
            reason: summary.to_owned(),
        });
    }
    let report: AuditReport =
        serde_json::from_value(value).map_err(|e| ProviderError::InvalidResponse {
            provider: PROVIDER_ID.to_owned(),
            reason: e.to_string(),
        })?;
    Ok(report.vulnerabilities.into_values().collect())
}

/// 감사 결과를 대상별 권고로 펼칩니다.
pub fn findings(vulns: Vec<AuditVulnerability>, targets: &[ScanTarget]) -> Vec<NpmFinding> {
    let mut out = Vec::new();
    for vuln in vulns {
        let advisories: Vec<AuditAdvisory> = vuln
            .via
            .iter()
            .filter(|v| v.is_object())
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
        for target in targets.iter().filter(|t| t.name == vuln.name) {
            for advisory in &advisories {
                let mut advisory = advisory.clone();
                if advisory.severity.is_empty() {
                    advisory.severity = vuln.severity.clone();
                }
                if advisory.range.is_empty() {
                    advisory.range = vuln.range.clone();
                }
                out.push(NpmFinding {
                    target: target.clone(),
                    advisory,
                    fix: vuln.fix_available.clone(),
                });
            }
        }
    }
    out
}

/// npm CLI provider
pub struct NpmAuditProvider {
    dir: PathBuf,
}

impl NpmAuditProvider {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

impl SecurityProvider for NpmAuditProvider {
    type Finding = NpmFinding;

    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn scan(&self, targets: &[ScanTarget]) -> Result<Vec<SecurityAlert>, ProviderError> {
        let report = JsonCommand {
            provider: PROVIDER_ID,
            binary: BINARY,
            args: &["audit", "--json"],
            dir: &self.dir,
            envs: Vec::new(),
            data_exit_codes: &[0, 1],
        }
        .run()
        .await?;

        let mut seen = HashSet::new();
        Ok(findings(parse_report(report)?, targets)
            .iter()
            .filter(|f| seen.insert((f.target.clone(), f.advisory.url.clone(), f.advisory.title.clone())))
            .map(|f| self.to_alert(f))
            .collect())
    }

    /// `fixAvailable`이 같은 패키지를 가리키면 그 버전, 아니면 `<X` 범위에서 `X`
    fn extract_patched_version(&self, finding: &NpmFinding) -> Option<String> {
        if let FixAvailable::Upgrade { name, version } = &finding.fix
            && name == &finding.target.name
        {
            return Some(version.clone());
        }
        version::fixed_from_vulnerable_range(&finding.advisory.range)
    }

    fn to_alert(&self, finding: &NpmFinding) -> SecurityAlert {
        let patched_version = self.extract_patched_version(finding);
        SecurityAlert {
            package_name: finding.target.name.clone(),
            current_version: finding.target.version.clone(),
            severity: self.normalize_severity(&finding.advisory.severity),
            title: finding.advisory.title.clone(),
            description: String::new(),
            // npm audit은 CVE를 주지 않으므로 권고 URL의 GHSA를 식별자로 사용
            cve: ghsa_from_url(&finding.advisory.url).map(str::to_owned),
            fix_available: patched_version.is_some(),
            patched_version,
            vulnerable_versions: finding.advisory.range.clone(),
            url: finding.advisory.url.clone(),
            provider: PROVIDER_ID.to_owned(),
            corroborated_by: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinkeeper_core::types::Severity;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "auditReportVersion": 2,
            "vulnerabilities": {
                "minimist": {
                    "name": "minimist",
                    "severity": "critical",
                    "isDirect": false,
                    "via": [{
                        "source": 1066302,
                        "name": "minimist",
                        "dependency": "minimist",
                        "title": "Prototype Pollution in minimist",
                        "url": "https://github.com/advisories/GHSA-xvch-5gv4-984h",
                        "severity": "critical",
                        "range": ">=1.0.0 <1.2.6"
                    }],
                    "effects": ["mkdirp"],
                    "range": "1.0.0 - 1.2.5",
                    "fixAvailable": true
                },
                "mkdirp": {
                    "name": "mkdirp",
                    "severity": "critical",
                    "via": ["minimist"],
                    "range": "0.4.1 - 0.5.1",
                    "fixAvailable": { "name": "mkdirp", "version": "0.5.6", "isSemVerMajor": false }
                },
                "axios": {
                    "name": "axios",
                    "severity": "moderate",
                    "via": [{
                        "title": "Axios Cross-Site Request Forgery Vulnerability",
                        "url": "https://github.com/advisories/GHSA-wf5p-g6vw-rhxx",
                        "severity": "moderate",
                        "range": ">=1.0.0 <=1.5.1"
                    }],
                    "range": "1.0.0 - 1.5.1",
                    "fixAvailable": { "name": "axios", "version": "1.6.0", "isSemVerMajor": false }
                }
            },
            "metadata": { "vulnerabilities": { "critical": 2, "moderate": 1 } }
        })
    }

    #[test]
    fn transitive_via_strings_are_skipped() {
        let vulns = parse_report(sample()).unwrap();
        let found = findings(
            vulns,
            &[
                ScanTarget::new("minimist", "1.2.5"),
                ScanTarget::new("mkdirp", "0.5.1"),
            ],
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].target.name, "minimist");
    }

    #[test]
    fn fix_from_range_when_flag_only() {
        let provider = NpmAuditProvider::new(Path::new("."));
        let vulns = parse_report(sample()).unwrap();
        let found = findings(vulns, &[ScanTarget::new("minimist", "1.2.5")]);

        let alert = provider.to_alert(&found[0]);
        assert_eq!(alert.patched_version.as_deref(), Some("1.2.6"));
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.cve.as_deref(), Some("GHSA-xvch-5gv4-984h"));
    }

    #[test]
    fn fix_from_fix_available_object() {
        let provider = NpmAuditProvider::new(Path::new("."));
        let vulns = parse_report(sample()).unwrap();
        let found = findings(vulns, &[ScanTarget::new("axios", "1.5.0")]);

        let alert = provider.to_alert(&found[0]);
        assert_eq!(alert.patched_version.as_deref(), Some("1.6.0"));
        assert_eq!(alert.severity, Severity::Medium);
    }

    #[test]
    fn error_payload_is_invalid_response() {
        let err = parse_report(json!({ "error": { "code": "ENOLOCK", "summary": "This command requires an existing lockfile." } }))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
        assert!(err.to_string().contains("lockfile"));
    }
}
