//! override 필드 파싱
//!
//! 세 가지 메커니즘을 하나의 [`OverrideEntry`] 모델로 정규화합니다.
//!
//! | 메커니즘 | 필드 | 키 형식 |
//! |----------|------|---------|
//! | npm / bun | `overrides` | `pkg`, 중첩 객체 `{ "parent": { "pkg": .. } }`, 자기 고정 `"."` |
//! | yarn / bun | `resolutions` | `pkg`, `parent/pkg`, `**/pkg`, `@scope/pkg` |
//! | pnpm | `pnpm.overrides` | `pkg`, `parent>pkg`, `pkg@<range>` |

use pinkeeper_core::types::OverrideMechanism;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ManifestError;
use crate::manifest::Manifest;

/// npm 중첩 override의 자기 고정 키
pub const SELF_KEY: &str = ".";

/// resolutions의 "어디든" 경로 세그먼트
const ANY_DEPTH: &str = "**";

/// 선언된 override 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideEntry {
    /// 고정 대상 패키지
    pub package: String,
    /// 고정 버전 (선언된 그대로)
    pub version: String,
    /// 부모 체인 (flat 항목은 빈 배열)
    pub path: Vec<String>,
    /// 버전 selector (`pkg@<range>` 형식의 `<range>`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// 선언된 메커니즘
    pub mechanism: OverrideMechanism,
    /// 메커니즘 필드 내부의 JSON 키 체인
    #[serde(skip)]
    pub location: Vec<String>,
}

impl OverrideEntry {
    /// 새 flat override 항목
    pub fn flat(
        mechanism: OverrideMechanism,
        package: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let package = package.into();
        Self {
            location: vec![package.clone()],
            package,
            version: version.into(),
            path: Vec::new(),
            selector: None,
            mechanism,
        }
    }

    /// 부모 체인과 selector가 없는 항목인지 여부
    ///
    /// 보안 계획은 이런 항목에만 대응됩니다.
    pub fn is_flat(&self) -> bool {
        self.path.is_empty() && self.selector.is_none()
    }

    /// 이 override를 정당화하는 직접 의존성 이름
    ///
    /// 중첩 항목은 체인의 첫 부모, flat 항목은 패키지 자신입니다.
    pub fn lookup_name(&self) -> &str {
        self.path
            .iter()
            .map(String::as_str)
            .find(|seg| *seg != ANY_DEPTH)
            .map(|seg| split_selector(seg).0)
            .unwrap_or(&self.package)
    }

    /// appendix 키 (`name@version`)
    pub fn appendix_key(&self) -> String {
        crate::appendix::appendix_key(&self.package, &self.version)
    }

    /// 메커니즘과 무관한 대상 식별자 (충돌 판정용)
    pub fn target(&self) -> (Vec<&str>, &str, Option<&str>) {
        let path = self
            .path
            .iter()
            .filter(|seg| *seg != ANY_DEPTH)
            .map(|seg| split_selector(seg).0)
            .collect();
        (path, &self.package, self.selector.as_deref())
    }
}

/// 세그먼트를 패키지 이름과 selector로 나눕니다.
///
/// scoped 이름(`@scope/pkg@^1`)의 첫 `@`는 이름의 일부입니다.
pub fn split_selector(segment: &str) -> (&str, Option<&str>) {
    let search_from = usize::from(segment.starts_with('@'));
    match segment[search_from..].find('@') {
        Some(idx) => {
            let at = idx + search_from;
            let selector = &segment[at + 1..];
            (&segment[..at], (!selector.is_empty()).then_some(selector))
        }
        None => (segment, None),
    }
}

/// manifest의 모든 override를 파싱합니다.
pub fn parse_overrides(manifest: &Manifest) -> Result<Vec<OverrideEntry>, ManifestError> {
    let mut out = Vec::new();
    for mechanism in OverrideMechanism::ALL {
        let Some(field) = manifest.field(mechanism.field_path()) else {
            continue;
        };
        let ctx = Ctx {
            manifest: manifest.id().as_str(),
            mechanism,
        };
        let map = field.as_object().ok_or_else(|| ctx.invalid("", "expected an object"))?;
        match mechanism {
            OverrideMechanism::Overrides => parse_npm(&ctx, map, &[], &mut out)?,
            OverrideMechanism::Resolutions => parse_flat(&ctx, map, split_resolution_key, &mut out)?,
            OverrideMechanism::PnpmOverrides => parse_flat(&ctx, map, split_pnpm_key, &mut out)?,
        }
    }
    Ok(out)
}

struct Ctx<'a> {
    manifest: &'a str,
    mechanism: OverrideMechanism,
}

impl Ctx<'_> {
    fn invalid(&self, key: &str, reason: &str) -> ManifestError {
        ManifestError::InvalidOverride {
            manifest: self.manifest.to_owned(),
            field: self.mechanism.to_string(),
            key: key.to_owned(),
            reason: reason.to_owned(),
        }
    }
}

fn parse_npm(
    ctx: &Ctx<'_>,
    map: &Map<String, Value>,
    location: &[String],
    out: &mut Vec<OverrideEntry>,
) -> Result<(), ManifestError> {
    for (key, value) in map {
        let mut here = location.to_vec();
        here.push(key.clone());
        match value {
            Value::String(version) if key == SELF_KEY => {
                let Some((parent, chain)) = location.split_last() else {
                    return Err(ctx.invalid(key, "self reference outside a nested override"));
                };
                let (package, selector) = split_selector(parent);
                out.push(OverrideEntry {
                    package: package.to_owned(),
                    version: version.clone(),
                    path: chain.to_vec(),
                    selector: selector.map(str::to_owned),
                    mechanism: ctx.mechanism,
                    location: here,
                });
            }
            Value::String(version) => {
                let (package, selector) = split_selector(key);
                out.push(OverrideEntry {
                    package: package.to_owned(),
                    version: version.clone(),
                    path: location.to_vec(),
                    selector: selector.map(str::to_owned),
                    mechanism: ctx.mechanism,
                    location: here,
                });
            }
            Value::Object(nested) => parse_npm(ctx, nested, &here, out)?,
            _ => return Err(ctx.invalid(key, "expected a version string or nested object")),
        }
    }
    Ok(())
}

fn parse_flat(
    ctx: &Ctx<'_>,
    map: &Map<String, Value>,
    split: fn(&str) -> Option<(Vec<String>, String)>,
    out: &mut Vec<OverrideEntry>,
) -> Result<(), ManifestError> {
    for (key, value) in map {
        let version = value
            .as_str()
            .ok_or_else(|| ctx.invalid(key, "expected a version string"))?;
        let (path, last) = split(key).ok_or_else(|| ctx.invalid(key, "empty package name"))?;
        let (package, selector) = split_selector(&last);
        out.push(OverrideEntry {
            package: package.to_owned(),
            version: version.to_owned(),
            path,
            selector: selector.map(str::to_owned),
            mechanism: ctx.mechanism,
            location: vec![key.clone()],
        });
    }
    Ok(())
}

/// `a/@scope/b/**/c` → (["a", "@scope/b", "**"], "c")
fn split_resolution_key(key: &str) -> Option<(Vec<String>, String)> {
    let mut segments: Vec<String> = Vec::new();
    let mut parts = key.split('/');
    while let Some(part) = parts.next() {
        if part.starts_with('@')
            && let Some(name) = parts.next()
        {
            segments.push(format!("{part}/{name}"));
        } else {
            segments.push(part.to_owned());
        }
    }
    let last = segments.pop().filter(|s| !s.is_empty())?;
    Some((segments, last))
}

/// `a>b>c` → (["a", "b"], "c")
fn split_pnpm_key(key: &str) -> Option<(Vec<String>, String)> {
    let mut segments: Vec<String> = key.split('>').map(|s| s.trim().to_owned()).collect();
    let last = segments.pop().filter(|s| !s.is_empty())?;
    Some((segments, last))
}

/// 새 항목의 메커니즘 필드 내 키를 만듭니다.
pub fn location_for(mechanism: OverrideMechanism, path: &[String], package: &str) -> Vec<String> {
    match mechanism {
        OverrideMechanism::Overrides => {
            let mut loc = path.to_vec();
            loc.push(package.to_owned());
            loc
        }
        OverrideMechanism::Resolutions => {
            let mut segs = path.to_vec();
            segs.push(package.to_owned());
            vec![segs.join("/")]
        }
        OverrideMechanism::PnpmOverrides => {
            let mut segs = path.to_vec();
            segs.push(package.to_owned());
            vec![segs.join(">")]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestId;

    fn parse(text: &str) -> Result<Vec<OverrideEntry>, ManifestError> {
        let m = Manifest::parse(ManifestId::new("package.json"), "package.json", text, true)?;
        parse_overrides(&m)
    }

    #[test]
    fn split_selector_forms() {
        assert_eq!(split_selector("lodash"), ("lodash", None));
        assert_eq!(split_selector("lodash@<4.17.21"), ("lodash", Some("<4.17.21")));
        assert_eq!(split_selector("@babel/core"), ("@babel/core", None));
        assert_eq!(split_selector("@babel/core@^7"), ("@babel/core", Some("^7")));
        assert_eq!(split_selector("x@"), ("x", None));
    }

    #[test]
    fn npm_flat_and_nested() {
        let entries = parse(
            r#"{"overrides": {"qs": "6.11.2", "express": {".": "4.18.2", "body-parser": "1.20.2"}}}"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].package, "qs");
        assert!(entries[0].path.is_empty());
        assert_eq!(entries[0].lookup_name(), "qs");

        assert_eq!(entries[1].package, "express");
        assert_eq!(entries[1].version, "4.18.2");
        assert!(entries[1].path.is_empty());
        assert_eq!(entries[1].location, vec!["express", "."]);

        assert_eq!(entries[2].package, "body-parser");
        assert_eq!(entries[2].path, vec!["express"]);
        assert_eq!(entries[2].lookup_name(), "express");
    }

    #[test]
    fn npm_selector_on_parent() {
        let entries = parse(r#"{"overrides": {"react@^17": {"scheduler": "0.20.2"}}}"#).unwrap();
        assert_eq!(entries[0].lookup_name(), "react");
        assert_eq!(entries[0].target().0, vec!["react"]);
    }

    #[test]
    fn npm_top_level_self_key_is_invalid() {
        let err = parse(r#"{"overrides": {".": "1.0.0"}}"#).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidOverride { .. }));
    }

    #[test]
    fn npm_non_string_value_is_invalid() {
        let err = parse(r#"{"overrides": {"qs": 6}}"#).unwrap_err();
        assert!(err.to_string().contains("overrides"));
    }

    #[test]
    fn resolutions_key_forms() {
        let entries = parse(
            r#"{"resolutions": {
                "minimist": "1.2.6",
                "webpack/terser": "5.14.2",
                "**/trim": "0.0.3",
                "@babel/core": "7.22.0",
                "@storybook/react/@babel/traverse": "7.23.2"
            }}"#,
        )
        .unwrap();
        assert_eq!(entries[0].lookup_name(), "minimist");
        assert_eq!(entries[1].path, vec!["webpack"]);
        assert_eq!(entries[1].lookup_name(), "webpack");
        assert_eq!(entries[2].path, vec!["**"]);
        assert_eq!(entries[2].lookup_name(), "trim");
        assert_eq!(entries[3].package, "@babel/core");
        assert!(entries[3].path.is_empty());
        assert_eq!(entries[4].package, "@babel/traverse");
        assert_eq!(entries[4].lookup_name(), "@storybook/react");
    }

    #[test]
    fn pnpm_key_forms() {
        let entries = parse(
            r#"{"pnpm": {"overrides": {"foo": "1.0.0", "bar>baz": "2.0.0", "qux@<1.2.0": "1.2.0"}}}"#,
        )
        .unwrap();
        assert_eq!(entries[0].mechanism, OverrideMechanism::PnpmOverrides);
        assert_eq!(entries[1].package, "baz");
        assert_eq!(entries[1].lookup_name(), "bar");
        assert_eq!(entries[2].package, "qux");
        assert_eq!(entries[2].selector.as_deref(), Some("<1.2.0"));
        assert_eq!(entries[2].location, vec!["qux@<1.2.0"]);
    }

    #[test]
    fn non_object_field_is_invalid() {
        let err = parse(r#"{"resolutions": ["a"]}"#).unwrap_err();
        assert!(err.to_string().contains("expected an object"));
    }

    #[test]
    fn target_ignores_mechanism_and_any_depth() {
        let a = parse(r#"{"resolutions": {"**/trim": "0.0.3"}}"#).unwrap();
        let b = parse(r#"{"overrides": {"trim": "0.0.1"}}"#).unwrap();
        assert_eq!(a[0].target(), b[0].target());
    }

    #[test]
    fn location_for_each_mechanism() {
        let path = vec!["webpack".to_owned()];
        assert_eq!(
            location_for(OverrideMechanism::Overrides, &path, "terser"),
            vec!["webpack", "terser"]
        );
        assert_eq!(
            location_for(OverrideMechanism::Resolutions, &path, "terser"),
            vec!["webpack/terser"]
        );
        assert_eq!(
            location_for(OverrideMechanism::PnpmOverrides, &path, "terser"),
            vec!["webpack>terser"]
        );
    }
}
