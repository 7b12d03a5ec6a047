//! 스캔 대상 수집
//!
//! 각 패키지에 대해 보안 스캔할 구체 버전을 결정합니다.
//! 루트 manifest의 flat override가 있으면 그 버전을, 없으면 선언된 범위의 하한을 사용합니다.
//! 하한을 구할 수 없는 범위 (`latest`, git URL, `workspace:*`)는 건너뜁니다.

use std::collections::{BTreeMap, BTreeSet};

use pinkeeper_core::types::ScanTarget;
use pinkeeper_manifest::overrides::parse_overrides;
use pinkeeper_manifest::{DependentsIndex, Manifest, ManifestError};
use tracing::debug;

use crate::version;

/// 인덱스와 루트 override에서 스캔 대상 목록을 만듭니다.
///
/// 결과는 `name`, `version` 순으로 정렬되고 중복이 제거됩니다.
pub fn collect_targets(
    index: &DependentsIndex,
    root: &Manifest,
) -> Result<Vec<ScanTarget>, ManifestError> {
    let pinned: BTreeMap<String, String> = parse_overrides(root)?
        .into_iter()
        .filter(|entry| entry.path.is_empty() && entry.selector.is_none())
        .map(|entry| (entry.package, entry.version))
        .collect();

    let mut targets = BTreeSet::new();
    for (package, dependents) in index.packages() {
        if let Some(pin) = pinned.get(package)
            && version::lower_bound(pin).is_some()
        {
            targets.insert((package.to_owned(), pin.trim_start_matches('=').to_owned()));
            continue;
        }

        for dependent in dependents.values() {
            match version::lower_bound(&dependent.range) {
                Some(v) => {
                    targets.insert((package.to_owned(), v));
                }
                None => {
                    debug!(package, range = %dependent.range, "skipping unparseable range");
                }
            }
        }
    }

    // 어떤 manifest도 직접 선언하지 않은 루트 override도 스캔합니다.
    for (package, pin) in &pinned {
        if !index.declares(package)
            && let Some(v) = version::lower_bound(pin)
        {
            targets.insert((package.clone(), v));
        }
    }

    Ok(targets
        .into_iter()
        .map(|(name, version)| ScanTarget::new(name, version))
        .collect())
}
