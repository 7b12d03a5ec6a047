//! appendix — override별 존재 이유 기록
//!
//! manifest의 `pinkeeper.appendix`에 저장됩니다.
//!
//! ```json
//! "pinkeeper": {
//!   "appendix": {
//!     "lodash@4.17.21": {
//!       "dependents": { "web": "^4.17.0", "api": "~4.17.19" },
//!       "reason": "CVE-2021-23337"
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::manifest::Manifest;

/// appendix가 저장되는 네임스페이스 내 키
pub const APPENDIX_KEY: &str = "appendix";

/// appendix 키를 만듭니다 (`name@version`).
pub fn appendix_key(package: &str, version: &str) -> String {
    format!("{package}@{version}")
}

/// appendix 항목 하나
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendixEntry {
    /// dependent 이름 → 선언된 버전 범위
    #[serde(default)]
    pub dependents: BTreeMap<String, String>,
    /// 고정 이유 (CVE 참조 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// appendix 전체 (키 정렬)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Appendix {
    entries: BTreeMap<String, AppendixEntry>,
}

impl Appendix {
    pub fn new() -> Self {
        Self::default()
    }

    /// manifest에 기록된 appendix를 읽습니다.
    ///
    /// 형식이 잘못된 항목은 경고 후 무시합니다. 다음 조정에서 다시 계산됩니다.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let Some(raw) = manifest
            .namespace()
            .and_then(|ns| ns.get(APPENDIX_KEY))
        else {
            return Self::default();
        };
        let Some(map) = raw.as_object() else {
            warn!(manifest = %manifest.id(), "pinkeeper.appendix is not an object, ignoring");
            return Self::default();
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            match serde_json::from_value::<AppendixEntry>(value.clone()) {
                Ok(entry) => {
                    entries.insert(key.clone(), entry);
                }
                Err(e) => {
                    warn!(manifest = %manifest.id(), key = %key, error = %e, "ignoring malformed appendix entry");
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&AppendixEntry> {
        self.entries.get(key)
    }

    /// 기존 reason을 반환합니다.
    pub fn reason(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|e| e.reason.as_deref())
    }

    /// 항목을 추가합니다. 같은 키가 있으면 dependents를 합치고 기존 reason을 유지합니다.
    pub fn merge(&mut self, key: String, entry: AppendixEntry) {
        match self.entries.get_mut(&key) {
            Some(existing) => {
                existing.dependents.extend(entry.dependents);
                if existing.reason.is_none() {
                    existing.reason = entry.reason;
                }
            }
            None => {
                self.entries.insert(key, entry);
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AppendixEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON 값으로 변환합니다 (키 정렬 유지).
    pub fn to_value(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(k, entry)| {
                let mut obj = serde_json::Map::new();
                let dependents = entry
                    .dependents
                    .iter()
                    .map(|(name, range)| (name.clone(), Value::String(range.clone())))
                    .collect();
                obj.insert("dependents".to_owned(), Value::Object(dependents));
                if let Some(reason) = &entry.reason {
                    obj.insert("reason".to_owned(), Value::String(reason.clone()));
                }
                (k.clone(), Value::Object(obj))
            })
            .collect();
        Value::Object(map)
    }
}
