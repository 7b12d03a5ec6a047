//! Dependents 인덱스 — 패키지별 직접 선언 manifest 목록
//!
//! 각 manifest는 독립적으로 [`IndexContribution`]을 만들고,
//! [`DependentsIndex::build`]가 이를 단일 스레드에서 병합합니다.
//! 전이 의존성은 다루지 않습니다.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::manifest::{Manifest, ManifestId};

/// 한 manifest의 직접 의존성 선언
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependent {
    /// dependent 이름 (manifest `name`, 없으면 디렉토리 경로)
    pub name: String,
    /// 선언된 범위 (정규화하지 않음)
    pub range: String,
    /// devDependencies에서 왔는지 여부
    pub dev: bool,
}

/// 한 manifest가 인덱스에 기여하는 항목
#[derive(Debug, Clone)]
pub struct IndexContribution {
    manifest: ManifestId,
    entries: Vec<(String, Dependent)>,
}

impl IndexContribution {
    /// manifest의 `dependencies`와 (선택적으로) `devDependencies`를 수집합니다.
    ///
    /// 같은 패키지가 두 곳에 있으면 `dependencies` 쪽이 우선합니다.
    pub fn from_manifest(manifest: &Manifest, include_dev: bool) -> Self {
        let name = manifest.dependent_name();
        let mut entries: Vec<(String, Dependent)> = manifest
            .dependencies()
            .map(|(pkg, range)| {
                (
                    pkg.to_owned(),
                    Dependent {
                        name: name.clone(),
                        range: range.to_owned(),
                        dev: false,
                    },
                )
            })
            .collect();

        if include_dev {
            for (pkg, range) in manifest.dev_dependencies() {
                if entries.iter().any(|(p, _)| p == pkg) {
                    continue;
                }
                entries.push((
                    pkg.to_owned(),
                    Dependent {
                        name: name.clone(),
                        range: range.to_owned(),
                        dev: true,
                    },
                ));
            }
        }

        Self {
            manifest: manifest.id().clone(),
            entries,
        }
    }

    pub fn manifest(&self) -> &ManifestId {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 패키지 이름 → (manifest → 선언)
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependentsIndex {
    packages: BTreeMap<String, BTreeMap<ManifestId, Dependent>>,
}

impl DependentsIndex {
    /// 기여 목록을 병합해 인덱스를 만듭니다.
    pub fn build(contributions: impl IntoIterator<Item = IndexContribution>) -> Self {
        let mut packages: BTreeMap<String, BTreeMap<ManifestId, Dependent>> = BTreeMap::new();
        for contribution in contributions {
            for (pkg, dependent) in contribution.entries {
                packages
                    .entry(pkg)
                    .or_default()
                    .insert(contribution.manifest.clone(), dependent);
            }
        }
        Self { packages }
    }

    /// manifest 목록에서 바로 인덱스를 만듭니다.
    pub fn from_manifests(manifests: &[Manifest], include_dev: bool) -> Self {
        Self::build(
            manifests
                .iter()
                .map(|m| IndexContribution::from_manifest(m, include_dev)),
        )
    }

    /// 패키지를 직접 선언한 manifest 목록
    pub fn dependents_of(&self, package: &str) -> Option<&BTreeMap<ManifestId, Dependent>> {
        self.packages.get(package).filter(|m| !m.is_empty())
    }

    /// 어떤 manifest라도 패키지를 직접 선언했는지 반환합니다.
    pub fn declares(&self, package: &str) -> bool {
        self.dependents_of(package).is_some()
    }

    /// appendix용 dependents 맵 (dependent 이름 → 범위)
    ///
    /// 같은 이름의 manifest가 여럿이면 manifest 경로 순으로 첫 번째가 기록됩니다.
    pub fn appendix_dependents(&self, package: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(dependents) = self.dependents_of(package) {
            for dependent in dependents.values() {
                out.entry(dependent.name.clone())
                    .or_insert_with(|| dependent.range.clone());
            }
        }
        out
    }

    pub fn packages(&self) -> impl Iterator<Item = (&str, &BTreeMap<ManifestId, Dependent>)> {
        self.packages.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(id: &str, text: &str) -> Manifest {
        Manifest::parse(ManifestId::new(id), id, text, id == "package.json").unwrap()
    }

    #[test]
    fn two_manifests_declaring_lodash() {
        let a = manifest(
            "packages/a/package.json",
            r#"{"name": "dependentA", "dependencies": {"lodash": "^4.17.0"}}"#,
        );
        let b = manifest(
            "packages/b/package.json",
            r#"{"name": "dependentB", "devDependencies": {"lodash": "~4.17.19"}}"#,
        );
        let index = DependentsIndex::from_manifests(&[a, b], true);
        let deps = index.appendix_dependents("lodash");
        assert_eq!(deps.len(), 2);
        assert_eq!(deps["dependentA"], "^4.17.0");
        assert_eq!(deps["dependentB"], "~4.17.19");
    }

    #[test]
    fn exclude_dev_dependencies() {
        let m = manifest(
            "package.json",
            r#"{"name": "r", "dependencies": {"a": "1"}, "devDependencies": {"jest": "29"}}"#,
        );
        let index = DependentsIndex::from_manifests(std::slice::from_ref(&m), false);
        assert!(index.declares("a"));
        assert!(!index.declares("jest"));

        let with_dev = DependentsIndex::from_manifests(&[m], true);
        let jest = with_dev.dependents_of("jest").unwrap();
        assert!(jest.values().all(|d| d.dev));
    }

    #[test]
    fn dependencies_range_wins_over_dev() {
        let m = manifest(
            "package.json",
            r#"{"name": "r", "dependencies": {"a": "^1.0.0"}, "devDependencies": {"a": "^1.2.0"}}"#,
        );
        let index = DependentsIndex::from_manifests(&[m], true);
        let dep = index.dependents_of("a").unwrap().values().next().unwrap();
        assert_eq!(dep.range, "^1.0.0");
        assert!(!dep.dev);
    }

    #[test]
    fn ranges_recorded_verbatim() {
        let m = manifest(
            "package.json",
            r#"{"name": "r", "dependencies": {"a": ">= 1.0.0  < 2", "b": "github:x/y"}}"#,
        );
        let index = DependentsIndex::from_manifests(&[m], true);
        assert_eq!(index.appendix_dependents("a")["r"], ">= 1.0.0  < 2");
        assert_eq!(index.appendix_dependents("b")["r"], "github:x/y");
    }

    #[test]
    fn unnamed_member_uses_directory() {
        let m = manifest(
            "packages/tools/package.json",
            r#"{"dependencies": {"qs": "^6.9.0"}}"#,
        );
        let index = DependentsIndex::from_manifests(&[m], true);
        assert_eq!(index.appendix_dependents("qs")["packages/tools"], "^6.9.0");
    }

    #[test]
    fn undeclared_package_has_no_dependents() {
        let index = DependentsIndex::default();
        assert!(index.dependents_of("left-pad").is_none());
        assert!(index.appendix_dependents("left-pad").is_empty());
        assert!(index.is_empty());
    }
}
