//! manifest 편집 누적기
//!
//! [`ManifestEdits`]는 typed 편집을 모아 두었다가 [`ManifestEdits::apply`]에서
//! 원본 트리의 복사본에 한 번에 적용합니다. 원본 [`Manifest`](crate::Manifest)는 변경되지 않습니다.
//!
//! 키 삭제는 `shift_remove`를 사용해 나머지 키의 순서를 유지합니다.

use pinkeeper_core::types::OverrideMechanism;
use serde_json::{Map, Value};

use crate::appendix::{APPENDIX_KEY, Appendix};
use crate::manifest::NAMESPACE_KEY;

/// 단일 편집
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// override 값 설정 (없으면 생성)
    SetOverride {
        mechanism: OverrideMechanism,
        location: Vec<String>,
        version: String,
    },
    /// override 삭제
    RemoveOverride {
        mechanism: OverrideMechanism,
        location: Vec<String>,
    },
    /// appendix 교체 (비어 있으면 삭제)
    ReplaceAppendix(Appendix),
}

/// 한 manifest에 대한 편집 목록
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestEdits {
    edits: Vec<Edit>,
}

impl ManifestEdits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_override(
        &mut self,
        mechanism: OverrideMechanism,
        location: Vec<String>,
        version: impl Into<String>,
    ) -> &mut Self {
        self.edits.push(Edit::SetOverride {
            mechanism,
            location,
            version: version.into(),
        });
        self
    }

    pub fn remove_override(
        &mut self,
        mechanism: OverrideMechanism,
        location: Vec<String>,
    ) -> &mut Self {
        self.edits.push(Edit::RemoveOverride {
            mechanism,
            location,
        });
        self
    }

    pub fn replace_appendix(&mut self, appendix: Appendix) -> &mut Self {
        self.edits.push(Edit::ReplaceAppendix(appendix));
        self
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// 원본 트리의 복사본에 모든 편집을 적용한 결과를 반환합니다.
    pub fn apply(&self, original: &Value) -> Value {
        let mut value = original.clone();
        let Some(root) = value.as_object_mut() else {
            return value;
        };
        for edit in &self.edits {
            match edit {
                Edit::SetOverride {
                    mechanism,
                    location,
                    version,
                } => {
                    if let Some(field) = ensure_object_path(root, mechanism.field_path()) {
                        set_at(field, location, Value::String(version.clone()));
                    }
                }
                Edit::RemoveOverride {
                    mechanism,
                    location,
                } => remove_override(root, *mechanism, location),
                Edit::ReplaceAppendix(appendix) => replace_appendix(root, appendix),
            }
        }
        value
    }
}

/// 객체 경로를 따라 내려가며 없는 객체는 끝에 추가합니다.
///
/// 경로 중간의 객체가 아닌 값은 빈 객체로 교체됩니다.
fn ensure_object_path<'a>(
    root: &'a mut Map<String, Value>,
    path: &[&str],
) -> Option<&'a mut Map<String, Value>> {
    let mut current = root;
    for key in path {
        let slot = current
            .entry((*key).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = slot.as_object_mut()?;
    }
    Some(current)
}

fn set_at(map: &mut Map<String, Value>, location: &[String], value: Value) {
    let Some((last, parents)) = location.split_last() else {
        return;
    };
    let parents: Vec<&str> = parents.iter().map(String::as_str).collect();
    if let Some(target) = ensure_object_path(map, &parents) {
        // 기존 키는 insert가 제자리에서 값만 교체
        target.insert(last.clone(), value);
    }
}

fn remove_at(map: &mut Map<String, Value>, location: &[String]) -> bool {
    match location {
        [] => false,
        [last] => map.shift_remove(last).is_some(),
        [head, rest @ ..] => {
            let Some(Value::Object(child)) = map.get_mut(head) else {
                return false;
            };
            let removed = remove_at(child, rest);
            if removed && child.is_empty() {
                map.shift_remove(head);
            }
            removed
        }
    }
}

fn remove_override(root: &mut Map<String, Value>, mechanism: OverrideMechanism, location: &[String]) {
    let path = mechanism.field_path();
    let mut full: Vec<String> = path.iter().map(|s| (*s).to_owned()).collect();
    full.extend(location.iter().cloned());
    // 마지막 항목이 빠지면 필드 자체도 비게 되어 함께 정리됨
    remove_at(root, &full);
}

fn replace_appendix(root: &mut Map<String, Value>, appendix: &Appendix) {
    if appendix.is_empty() {
        remove_at(root, &[NAMESPACE_KEY.to_owned(), APPENDIX_KEY.to_owned()]);
        return;
    }
    if let Some(namespace) = ensure_object_path(root, &[NAMESPACE_KEY]) {
        namespace.insert(APPENDIX_KEY.to_owned(), appendix.to_value());
    }
}
