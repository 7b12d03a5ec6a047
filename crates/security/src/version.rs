//! 시맨틱 버전 비교 -- 영향 범위 매칭, npm 범위 하한, 버전 정렬
//!
//! `semver` 크레이트를 사용합니다. SemVer가 아닌 버전 문자열은 문자열 비교로 fallback합니다.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// 영향받는 버전 범위
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    /// 도입 버전 (이 버전부터 영향)
    pub introduced: Option<String>,
    /// 수정 버전 (이 버전에서 수정됨, None이면 미수정)
    pub fixed: Option<String>,
}

/// 주어진 버전이 영향 범위에 포함되는지 확인합니다.
///
/// # 매칭 규칙
///
/// - `introduced`가 None이면 시작 제한 없음
/// - `fixed`가 None이면 아직 수정되지 않음
/// - `introduced <= version < fixed`이면 영향받음
///
/// 여러 범위 중 하나라도 매칭되면 `true`를 반환합니다.
pub fn is_affected(version_str: &str, ranges: &[VersionRange]) -> bool {
    ranges.iter().any(|range| is_in_range(version_str, range))
}

/// 버전이 속한 첫 번째 범위를 반환합니다.
pub fn matching_range<'a>(version_str: &str, ranges: &'a [VersionRange]) -> Option<&'a VersionRange> {
    ranges.iter().find(|range| is_in_range(version_str, range))
}

fn is_in_range(version_str: &str, range: &VersionRange) -> bool {
    if let Ok(version) = semver::Version::parse(version_str) {
        return is_in_range_semver(&version, range);
    }
    is_in_range_string(version_str, range)
}

fn is_in_range_semver(version: &semver::Version, range: &VersionRange) -> bool {
    if let Some(ref introduced) = range.introduced
        && let Ok(intro_ver) = semver::Version::parse(introduced)
        && version < &intro_ver
    {
        return false;
    }

    if let Some(ref fixed) = range.fixed
        && let Ok(fix_ver) = semver::Version::parse(fixed)
        && version >= &fix_ver
    {
        return false;
    }

    true
}

/// 문자열 비교로 범위 매칭 (SemVer 파싱 실패 시 fallback)
fn is_in_range_string(version: &str, range: &VersionRange) -> bool {
    if let Some(ref introduced) = range.introduced
        && version < introduced.as_str()
    {
        return false;
    }

    if let Some(ref fixed) = range.fixed
        && version >= fixed.as_str()
    {
        return false;
    }

    true
}

/// 두 버전 문자열을 비교합니다. SemVer가 아니면 문자열 비교합니다.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

/// `a >= b`이고 둘 다 SemVer인지 반환합니다.
///
/// 어느 한쪽이라도 SemVer가 아니면 (예: `$react`, `npm:alias@1`) `false`입니다.
pub fn satisfies_minimum(a: &str, b: &str) -> bool {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va >= vb,
        _ => false,
    }
}

/// npm 범위 문자열의 하한 버전을 구합니다.
///
/// | 범위 | 하한 |
/// |------|------|
/// | `^1.2.3`, `~1.2.3`, `>=1.2.3`, `1.2.3` | `1.2.3` |
/// | `~1.2`, `1.2.x` | `1.2.0` |
/// | `>=1.0.0 <2` | `1.0.0` |
/// | `1.2.3 - 2.0.0` | `1.2.3` |
/// | `^1.0.0 \|\| ^2.0.0` | `1.0.0` (첫 번째 대안) |
///
/// 하한이 없거나 (`*`, `<2`) 레지스트리 범위가 아니면 (`latest`, git URL,
/// `workspace:*`, `file:`) `None`을 반환합니다.
pub fn lower_bound(range: &str) -> Option<String> {
    let first = range.split("||").next()?.trim();
    if first.is_empty() || first.contains(':') || first.contains('/') {
        return None;
    }

    // 하이픈 범위: `a - b`
    if let Some((low, _)) = first.split_once(" - ") {
        return complete_version(low.trim());
    }

    let mut tokens = first.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        // `>= 1.2.3`처럼 연산자와 버전 사이에 공백이 있는 경우
        let joined;
        let token = if matches!(token, ">=" | ">" | "<" | "<=" | "=" | "^" | "~")
            && let Some(next) = tokens.next()
        {
            joined = format!("{token}{next}");
            joined.as_str()
        } else {
            token
        };

        if token.starts_with('<') || token.starts_with('>') && !token.starts_with(">=") {
            continue;
        }
        let version = token.trim_start_matches(['^', '~', '>', '=', 'v']);
        let version = version.trim_start_matches('v');
        if let Some(v) = complete_version(version) {
            return Some(v);
        }
    }
    None
}

/// `1` → `1.0.0`, `1.2` → `1.2.0`, `1.x` → `1.0.0`
fn complete_version(partial: &str) -> Option<String> {
    let partial = partial.trim().trim_start_matches(['v', '=']);
    if partial.is_empty() {
        return None;
    }
    if semver::Version::parse(partial).is_ok() {
        return Some(partial.to_owned());
    }

    let mut parts: Vec<&str> = Vec::with_capacity(3);
    for part in partial.split('.') {
        if matches!(part, "x" | "X" | "*") {
            break;
        }
        parts.push(part);
    }
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    let candidate = parts.join(".");
    semver::Version::parse(&candidate).ok().map(|_| candidate)
}

/// `<X` 형식의 취약 범위에서 수정 버전 `X`를 구합니다.
///
/// `>=1.0.0 <1.2.6`처럼 복합 범위의 마지막 상한도 인정합니다.
/// `<=X`는 포함 상한이므로 수정 버전을 알 수 없습니다.
pub fn fixed_from_vulnerable_range(range: &str) -> Option<String> {
    let last = range.split("||").last()?.trim();
    let mut tokens = last.split_whitespace().peekable();
    let mut upper = None;
    while let Some(token) = tokens.next() {
        let token = if token == "<"
            && let Some(next) = tokens.next()
        {
            format!("<{next}")
        } else {
            token.to_owned()
        };
        if token.starts_with("<=") {
            upper = None;
        } else if let Some(v) = token.strip_prefix('<') {
            upper = complete_version(v);
        }
    }
    upper
}
