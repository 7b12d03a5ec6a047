//! Manifest 모델 — `package.json` 파싱, 형식 감지, 렌더링
//!
//! [`Manifest`]는 원본 JSON 트리를 소유하며 외부에서 직접 수정할 수 없습니다.
//! 모든 변경은 [`ManifestEdits`](crate::edits::ManifestEdits)로 누적된 뒤
//! [`Manifest::render`]에서 한 번에 직렬화됩니다.
//!
//! 원본 텍스트를 함께 보관하며, 렌더링은 값이 바뀐 구간만 교체합니다.
//! 새로 쓰는 값에는 로딩 시 감지한 들여쓰기를 사용합니다.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use pinkeeper_core::config::DepPaths;
use pinkeeper_core::types::OverrideMechanism;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ManifestError;
use crate::splice;

/// manifest 파일 이름
pub const MANIFEST_FILE: &str = "package.json";

/// manifest 내 pinkeeper 전용 네임스페이스 키
pub const NAMESPACE_KEY: &str = "pinkeeper";

/// manifest 파일 최대 크기 (10 MB)
pub const MAX_MANIFEST_SIZE: u64 = 10 * 1024 * 1024;

/// manifest 식별자 — workspace 루트 기준 상대 경로 (`/` 구분자)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ManifestId(String);

impl ManifestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 절대 경로와 workspace 루트로부터 식별자를 만듭니다.
    ///
    /// 루트 밖의 경로는 전체 경로 문자열을 그대로 사용합니다.
    pub fn from_paths(path: &Path, root_dir: &Path) -> Self {
        match path.strip_prefix(root_dir) {
            Ok(rel) => Self(rel_path_slash(rel)),
            Err(_) => Self(path.display().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// manifest가 위치한 디렉토리의 상대 경로 (루트면 `.`)
    pub fn dir(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => ".",
        }
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 들여쓰기 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indent {
    /// 공백 N칸
    Spaces(usize),
    /// 탭
    Tab,
}

impl Indent {
    pub(crate) fn as_bytes(&self) -> Vec<u8> {
        match self {
            Self::Spaces(n) => vec![b' '; *n],
            Self::Tab => vec![b'\t'],
        }
    }
}

/// 원본 파일의 형식 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formatting {
    pub indent: Indent,
    pub trailing_newline: bool,
}

impl Default for Formatting {
    fn default() -> Self {
        Self {
            indent: Indent::Spaces(2),
            trailing_newline: true,
        }
    }
}

impl Formatting {
    /// 원본 텍스트에서 들여쓰기와 마지막 개행 여부를 감지합니다.
    ///
    /// 들여쓰기된 줄이 없으면 (한 줄짜리 JSON) 공백 2칸을 사용합니다.
    pub fn detect(text: &str) -> Self {
        let indent = text
            .lines()
            .skip(1)
            .find_map(|line| {
                if line.starts_with('\t') {
                    Some(Indent::Tab)
                } else {
                    let n = line.len() - line.trim_start_matches(' ').len();
                    (n > 0 && line.len() > n).then_some(Indent::Spaces(n))
                }
            })
            .unwrap_or(Indent::Spaces(2));
        Self {
            indent,
            trailing_newline: text.ends_with('\n'),
        }
    }
}

/// 파싱된 `package.json`
#[derive(Debug, Clone)]
pub struct Manifest {
    id: ManifestId,
    path: PathBuf,
    value: Value,
    text: String,
    format: Formatting,
    is_root: bool,
}

impl Manifest {
    /// 텍스트에서 manifest를 파싱합니다.
    pub fn parse(
        id: ManifestId,
        path: impl Into<PathBuf>,
        text: &str,
        is_root: bool,
    ) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ManifestError::Parse {
            path: id.to_string(),
            reason: e.to_string(),
        })?;
        if !value.is_object() {
            return Err(ManifestError::Parse {
                path: id.to_string(),
                reason: "top-level value must be an object".to_owned(),
            });
        }
        Ok(Self {
            id,
            path: path.into(),
            value,
            text: text.to_owned(),
            format: Formatting::detect(text),
            is_root,
        })
    }

    /// 디스크에서 manifest를 읽습니다 (동기 I/O).
    ///
    /// `tokio::task::spawn_blocking` 내에서 호출되어야 합니다.
    pub fn load(path: &Path, root_dir: &Path, is_root: bool) -> Result<Self, ManifestError> {
        let id = ManifestId::from_paths(path, root_dir);
        let metadata = std::fs::metadata(path).map_err(|e| ManifestError::Read {
            path: id.to_string(),
            source: e,
        })?;
        if metadata.len() > MAX_MANIFEST_SIZE {
            return Err(ManifestError::FileTooBig {
                path: id.to_string(),
                size: metadata.len(),
                max: MAX_MANIFEST_SIZE,
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: id.to_string(),
            source: e,
        })?;
        debug!(manifest = %id, bytes = text.len(), "manifest loaded");
        Self::parse(id, path, &text, is_root)
    }

    pub fn id(&self) -> &ManifestId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// 원본 JSON 트리 (읽기 전용)
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn format(&self) -> Formatting {
        self.format
    }

    /// `name` 필드
    pub fn name(&self) -> Option<&str> {
        self.value.get("name").and_then(Value::as_str)
    }

    /// appendix에 기록되는 dependent 이름 — `name` 필드, 없으면 루트 기준 디렉토리 경로
    pub fn dependent_name(&self) -> String {
        match self.name() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => self.id.dir().to_owned(),
        }
    }

    /// `dependencies` 항목 (문자열 값만)
    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &str)> {
        string_entries(self.value.get("dependencies"))
    }

    /// `devDependencies` 항목 (문자열 값만)
    pub fn dev_dependencies(&self) -> impl Iterator<Item = (&str, &str)> {
        string_entries(self.value.get("devDependencies"))
    }

    /// 중첩 필드 조회 (`["pnpm", "overrides"]` 등)
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.value, |v, key| v.get(*key))
    }

    /// 해당 메커니즘의 필드가 존재하는지 반환합니다.
    pub fn has_mechanism(&self, mechanism: OverrideMechanism) -> bool {
        self.field(mechanism.field_path()).is_some()
    }

    /// 필드가 존재하는 메커니즘 목록 (탐색 우선순위 순)
    pub fn present_mechanisms(&self) -> Vec<OverrideMechanism> {
        OverrideMechanism::ALL
            .into_iter()
            .filter(|m| self.has_mechanism(*m))
            .collect()
    }

    /// `workspaces` 선언 (배열 또는 `{ "packages": [...] }`)
    pub fn workspaces(&self) -> Option<Vec<String>> {
        let decl = self.value.get("workspaces")?;
        let list = match decl {
            Value::Array(_) => decl,
            Value::Object(obj) => obj.get("packages")?,
            _ => return None,
        };
        let globs: Vec<String> = list
            .as_array()?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect();
        (!globs.is_empty()).then_some(globs)
    }

    /// `pinkeeper` 네임스페이스 객체
    pub fn namespace(&self) -> Option<&serde_json::Map<String, Value>> {
        self.value.get(NAMESPACE_KEY).and_then(Value::as_object)
    }

    /// `pinkeeper.depPaths`
    pub fn namespace_dep_paths(&self) -> Option<DepPaths> {
        let raw = self.namespace()?.get("depPaths")?;
        match serde_json::from_value(raw.clone()) {
            Ok(paths) => Some(paths),
            Err(e) => {
                tracing::warn!(manifest = %self.id, error = %e, "ignoring malformed pinkeeper.depPaths");
                None
            }
        }
    }

    /// `pinkeeper.ignore`
    pub fn namespace_ignore(&self) -> Vec<String> {
        self.namespace()
            .and_then(|ns| ns.get("ignore"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 원본 파일 텍스트
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 편집된 JSON 트리를 렌더링합니다.
    ///
    /// 원본 텍스트에서 값이 바뀐 멤버의 구간만 교체하므로 편집하지 않은 필드는
    /// 바이트 단위로 그대로 남습니다. 원본과 트리를 대응시킬 수 없을 때만
    /// (중복 키 등) 전체를 원본 들여쓰기로 다시 직렬화합니다.
    pub fn render(&self, value: &Value) -> Result<String, ManifestError> {
        if let Some(text) =
            splice::render_preserving(&self.text, &self.value, value, self.format.indent)
        {
            return Ok(text);
        }
        debug!(manifest = %self.id, "original layout not reusable, rendering whole manifest");
        self.render_full(value)
    }

    fn render_full(&self, value: &Value) -> Result<String, ManifestError> {
        let indent = self.format.indent.as_bytes();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
        let mut out = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        value
            .serialize(&mut ser)
            .map_err(|e| ManifestError::Serialize {
                path: self.id.to_string(),
                reason: e.to_string(),
            })?;
        let mut text = String::from_utf8(out).map_err(|e| ManifestError::Serialize {
            path: self.id.to_string(),
            reason: e.to_string(),
        })?;
        if self.format.trailing_newline {
            text.push('\n');
        }
        Ok(text)
    }
}

/// 여러 manifest를 병렬로 로드합니다.
///
/// 결과는 입력 순서를 유지합니다. 하나라도 실패하면 첫 번째 에러를 반환합니다.
pub async fn load_all(
    root_dir: &Path,
    paths: Vec<PathBuf>,
    root_manifest: &Path,
) -> Result<Vec<Manifest>, ManifestError> {
    let mut set = tokio::task::JoinSet::new();
    for (idx, path) in paths.into_iter().enumerate() {
        let root_dir = root_dir.to_path_buf();
        let is_root = path == root_manifest;
        set.spawn_blocking(move || (idx, Manifest::load(&path, &root_dir, is_root)));
    }

    let mut loaded = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let (idx, result) = joined.map_err(|e| ManifestError::Join(e.to_string()))?;
        loaded.push((idx, result?));
    }
    loaded.sort_by_key(|(idx, _)| *idx);
    Ok(loaded.into_iter().map(|(_, m)| m).collect())
}

fn string_entries(value: Option<&Value>) -> impl Iterator<Item = (&str, &str)> {
    value
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|map| map.iter())
        .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
}

/// 상대 경로를 `/` 구분 문자열로 변환합니다.
pub(crate) fn rel_path_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(text: &str) -> Manifest {
        Manifest::parse(ManifestId::new("package.json"), "/w/package.json", text, true).unwrap()
    }

    #[test]
    fn detects_two_space_indent() {
        let f = Formatting::detect("{\n  \"name\": \"a\"\n}\n");
        assert_eq!(f.indent, Indent::Spaces(2));
        assert!(f.trailing_newline);
    }

    #[test]
    fn detects_four_space_and_tab_indent() {
        assert_eq!(
            Formatting::detect("{\n    \"name\": \"a\"\n}").indent,
            Indent::Spaces(4)
        );
        assert_eq!(Formatting::detect("{\n\t\"name\": \"a\"\n}").indent, Indent::Tab);
        assert!(!Formatting::detect("{\n\t\"name\": \"a\"\n}").trailing_newline);
    }

    #[test]
    fn single_line_defaults_to_two_spaces() {
        assert_eq!(Formatting::detect("{\"name\":\"a\"}").indent, Indent::Spaces(2));
    }

    #[test]
    fn parse_rejects_non_object() {
        let err = Manifest::parse(ManifestId::new("package.json"), "p", "[1,2]", true).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let err = Manifest::parse(ManifestId::new("package.json"), "p", "{", true).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn render_preserves_key_order_and_format() {
        let text = "{\n    \"version\": \"1.0.0\",\n    \"name\": \"z\",\n    \"dependencies\": {\n        \"b\": \"1\",\n        \"a\": \"2\"\n    }\n}\n";
        let m = manifest(text);
        assert_eq!(m.render(m.value()).unwrap(), text);
    }

    #[test]
    fn render_with_tabs_without_trailing_newline() {
        let text = "{\n\t\"name\": \"t\"\n}";
        let m = manifest(text);
        assert_eq!(m.render(m.value()).unwrap(), text);
    }

    #[test]
    fn render_edit_keeps_other_fields_verbatim() {
        let text = "{\n  \"files\": [\"dist\", \"lib\"],\n  \"description\": \"caf\\u00e9\",\n  \"version\": \"1.0.0\"\n}\n";
        let m = manifest(text);
        let mut edited = m.value().clone();
        edited["version"] = Value::String("1.0.1".to_owned());
        assert_eq!(
            m.render(&edited).unwrap(),
            "{\n  \"files\": [\"dist\", \"lib\"],\n  \"description\": \"caf\\u00e9\",\n  \"version\": \"1.0.1\"\n}\n"
        );
    }

    #[test]
    fn render_falls_back_for_duplicate_keys() {
        let m = manifest("{\"a\": 1, \"a\": 2}");
        assert_eq!(m.render(m.value()).unwrap(), "{\n  \"a\": 2\n}");
    }

    #[test]
    fn dependencies_skip_non_string_values() {
        let m = manifest(r#"{"dependencies": {"a": "^1.0.0", "b": {"x": 1}}, "devDependencies": {"c": "2"}}"#);
        assert_eq!(m.dependencies().collect::<Vec<_>>(), vec![("a", "^1.0.0")]);
        assert_eq!(m.dev_dependencies().collect::<Vec<_>>(), vec![("c", "2")]);
    }

    #[test]
    fn workspaces_array_and_object_forms() {
        let a = manifest(r#"{"workspaces": ["packages/*"]}"#);
        assert_eq!(a.workspaces(), Some(vec!["packages/*".to_owned()]));
        let b = manifest(r#"{"workspaces": {"packages": ["apps/*"], "nohoist": []}}"#);
        assert_eq!(b.workspaces(), Some(vec!["apps/*".to_owned()]));
        let c = manifest(r#"{"workspaces": []}"#);
        assert_eq!(c.workspaces(), None);
    }

    #[test]
    fn namespace_settings() {
        let m = manifest(
            r#"{"pinkeeper": {"depPaths": ["packages/*"], "ignore": ["packages/old"]}}"#,
        );
        assert_eq!(
            m.namespace_dep_paths(),
            Some(DepPaths::Globs(vec!["packages/*".to_owned()]))
        );
        assert_eq!(m.namespace_ignore(), vec!["packages/old".to_owned()]);

        let w = manifest(r#"{"pinkeeper": {"depPaths": "workspace"}}"#);
        assert_eq!(w.namespace_dep_paths(), Some(DepPaths::Workspace));
    }

    #[test]
    fn dependent_name_falls_back_to_directory() {
        let m = Manifest::parse(
            ManifestId::new("packages/web/package.json"),
            "/w/packages/web/package.json",
            "{}",
            false,
        )
        .unwrap();
        assert_eq!(m.dependent_name(), "packages/web");
        assert_eq!(manifest(r#"{"name": "root"}"#).dependent_name(), "root");
        assert_eq!(manifest("{}").dependent_name(), ".");
    }

    #[test]
    fn present_mechanisms_in_priority_order() {
        let m = manifest(r#"{"pnpm": {"overrides": {}}, "resolutions": {}}"#);
        assert_eq!(
            m.present_mechanisms(),
            vec![OverrideMechanism::Resolutions, OverrideMechanism::PnpmOverrides]
        );
    }

    #[test]
    fn manifest_id_from_paths() {
        let id = ManifestId::from_paths(
            Path::new("/w/packages/a/package.json"),
            Path::new("/w"),
        );
        assert_eq!(id.as_str(), "packages/a/package.json");
        assert_eq!(id.dir(), "packages/a");
    }

    #[tokio::test]
    async fn load_all_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("package.json");
        std::fs::write(&root, r#"{"name": "root"}"#).unwrap();
        let member_dir = dir.path().join("packages/a");
        std::fs::create_dir_all(&member_dir).unwrap();
        let member = member_dir.join("package.json");
        std::fs::write(&member, r#"{"name": "a"}"#).unwrap();

        let loaded = load_all(dir.path(), vec![root.clone(), member], &root)
            .await
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].is_root());
        assert_eq!(loaded[1].name(), Some("a"));
        assert!(!loaded[1].is_root());
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let err = Manifest::load(
            Path::new("/nonexistent/package.json"),
            Path::new("/nonexistent"),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }
}
