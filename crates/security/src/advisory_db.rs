//! 권고 데이터베이스 -- 번들 JSON 및 로컬 디렉토리 로딩과 조회
//!
//! [`AdvisoryDb`]는 npm 권고 목록을 보유하며 offline provider가 사용합니다.
//! 바이너리에 포함된 번들 DB에서 시작하고, `security.vuln_db_path`가 설정되면
//! 해당 디렉토리의 `npm.json`을 추가로 병합합니다.
//!
//! # JSON 형식
//!
//! ```json
//! [
//!   {
//!     "id": "GHSA-35jh-r3h4-6jhm",
//!     "cve": "CVE-2021-23337",
//!     "package": "lodash",
//!     "affected_ranges": [{ "introduced": "0.0.0", "fixed": "4.17.21" }],
//!     "vulnerable_versions": "<4.17.21",
//!     "fixed_version": "4.17.21",
//!     "severity": "high",
//!     "title": "Command Injection in lodash",
//!     "description": "...",
//!     "url": "https://github.com/advisories/GHSA-35jh-r3h4-6jhm"
//!   }
//! ]
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SecurityError;
use crate::version::VersionRange;

/// 번들 권고 DB
const BUNDLED_NPM_DB: &str = include_str!("../advisories/npm.json");

/// 로컬 권고 DB 파일 이름
pub const NPM_DB_FILE: &str = "npm.json";

/// 권고 DB 파일 최대 크기 (50 MB)
const MAX_ADVISORY_DB_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// 전체 권고 엔트리 최대 개수 (1,000,000개)
const MAX_ADVISORY_DB_ENTRIES: usize = 1_000_000;

/// 권고 엔트리
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    /// 권고 ID (GHSA 등)
    pub id: String,
    /// CVE ID
    #[serde(default)]
    pub cve: Option<String>,
    /// 영향받는 패키지명
    pub package: String,
    /// 영향받는 버전 범위
    pub affected_ranges: Vec<VersionRange>,
    /// npm 범위 표기 (보고용)
    #[serde(default)]
    pub vulnerable_versions: String,
    /// 수정된 버전
    #[serde(default)]
    pub fixed_version: Option<String>,
    /// 원본 심각도 문자열
    pub severity: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}

/// 권고 데이터베이스
///
/// 패키지 이름으로 인덱싱되어 O(1) 조회가 가능합니다.
#[derive(Debug, Default)]
pub struct AdvisoryDb {
    entries: Vec<AdvisoryRecord>,
    index: HashMap<String, Vec<usize>>,
}

impl AdvisoryDb {
    pub fn empty() -> Self {
        Self::default()
    }

    fn build_index(entries: &[AdvisoryRecord]) -> HashMap<String, Vec<usize>> {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            index.entry(entry.package.clone()).or_default().push(idx);
        }
        index
    }

    /// 엔트리 목록으로 데이터베이스를 생성합니다.
    pub fn from_entries(entries: Vec<AdvisoryRecord>) -> Self {
        let index = Self::build_index(&entries);
        Self { entries, index }
    }

    /// JSON 문자열에서 데이터베이스를 파싱합니다.
    pub fn from_json(json: &str) -> Result<Self, SecurityError> {
        let entries: Vec<AdvisoryRecord> = serde_json::from_str(json).map_err(|e| {
            SecurityError::AdvisoryDbParse(format!("failed to parse advisory db JSON: {e}"))
        })?;
        Ok(Self::from_entries(entries))
    }

    /// 바이너리에 포함된 번들 DB
    pub fn bundled() -> Result<Self, SecurityError> {
        Self::from_json(BUNDLED_NPM_DB)
    }

    /// 디렉토리의 `npm.json`을 로드합니다. 파일이 없으면 빈 DB를 반환합니다.
    ///
    /// # 보안 제한
    ///
    /// - 파일당 최대 50MB
    /// - 전체 엔트리 최대 1,000,000개
    ///
    /// # Note
    ///
    /// 동기 I/O를 수행합니다. async 컨텍스트에서는 `spawn_blocking`으로 감싸세요.
    pub fn load_from_dir(dir_path: &Path) -> Result<Self, SecurityError> {
        let file_path = dir_path.join(NPM_DB_FILE);
        let load_err = |reason: String| SecurityError::AdvisoryDbLoad {
            path: file_path.display().to_string(),
            reason,
        };

        let metadata = match std::fs::metadata(&file_path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %file_path.display(), "advisory db file not found, skipping");
                return Ok(Self::empty());
            }
            Err(e) => return Err(load_err(e.to_string())),
        };

        if metadata.len() > MAX_ADVISORY_DB_FILE_SIZE {
            return Err(load_err(format!(
                "file size {} bytes exceeds maximum {} bytes",
                metadata.len(),
                MAX_ADVISORY_DB_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(&file_path).map_err(|e| load_err(e.to_string()))?;
        let mut entries: Vec<AdvisoryRecord> = serde_json::from_str(&content).map_err(|e| {
            SecurityError::AdvisoryDbParse(format!("failed to parse {}: {e}", file_path.display()))
        })?;

        if entries.len() > MAX_ADVISORY_DB_ENTRIES {
            tracing::warn!(
                count = entries.len(),
                max = MAX_ADVISORY_DB_ENTRIES,
                "advisory database entry limit reached, truncating"
            );
            entries.truncate(MAX_ADVISORY_DB_ENTRIES);
        }

        tracing::info!(
            path = %file_path.display(),
            entries = entries.len(),
            "loaded local advisory database"
        );
        Ok(Self::from_entries(entries))
    }

    /// 다른 DB의 엔트리를 병합합니다. 같은 `(id, package)`는 뒤의 것이 이깁니다.
    pub fn merge(self, other: AdvisoryDb) -> Self {
        let mut entries = self.entries;
        for record in other.entries {
            match entries
                .iter_mut()
                .find(|e| e.id == record.id && e.package == record.package)
            {
                Some(existing) => *existing = record,
                None => entries.push(record),
            }
        }
        Self::from_entries(entries)
    }

    /// 패키지의 권고 목록
    pub fn lookup(&self, package: &str) -> Vec<&AdvisoryRecord> {
        self.index
            .get(package)
            .map(|indices| indices.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, package: &str, fixed: &str) -> AdvisoryRecord {
        AdvisoryRecord {
            id: id.to_owned(),
            cve: None,
            package: package.to_owned(),
            affected_ranges: vec![VersionRange {
                introduced: None,
                fixed: Some(fixed.to_owned()),
            }],
            vulnerable_versions: format!("<{fixed}"),
            fixed_version: Some(fixed.to_owned()),
            severity: "high".to_owned(),
            title: format!("issue in {package}"),
            description: String::new(),
            url: String::new(),
        }
    }

    #[test]
    fn bundled_db_parses() {
        let db = AdvisoryDb::bundled().unwrap();
        assert!(!db.is_empty());
        assert!(!db.lookup("lodash").is_empty());
        assert!(!db.lookup("qs").is_empty());
    }

    #[test]
    fn lookup_unknown_package_is_empty() {
        let db = AdvisoryDb::from_entries(vec![record("A-1", "x", "1.0.0")]);
        assert!(db.lookup("y").is_empty());
        assert_eq!(db.lookup("x").len(), 1);
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = AdvisoryDb::from_json("{not json").unwrap_err();
        assert!(matches!(err, SecurityError::AdvisoryDbParse(_)));
    }

    #[test]
    fn load_from_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = AdvisoryDb::load_from_dir(dir.path()).unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn load_from_dir_reads_npm_json() {
        let dir = tempfile::tempdir().unwrap();
        let json = serde_json::to_string(&vec![record("LOCAL-1", "left-pad", "1.3.0")]).unwrap();
        std::fs::write(dir.path().join(NPM_DB_FILE), json).unwrap();

        let db = AdvisoryDb::load_from_dir(dir.path()).unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.lookup("left-pad")[0].id, "LOCAL-1");
    }

    #[test]
    fn merge_replaces_same_id() {
        let base = AdvisoryDb::from_entries(vec![record("A-1", "x", "1.0.0")]);
        let local = AdvisoryDb::from_entries(vec![
            record("A-1", "x", "1.0.1"),
            record("B-1", "y", "2.0.0"),
        ]);
        let merged = base.merge(local);
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged.lookup("x")[0].fixed_version.as_deref(),
            Some("1.0.1")
        );
    }
}
