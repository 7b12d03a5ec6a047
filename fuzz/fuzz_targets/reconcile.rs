#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value, json};

use pinkeeper_manifest::{DependentsIndex, Manifest, ManifestId, Reconciler, stage};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// member가 선언하는 의존성 (최대 16개로 제한)
    dependencies: Vec<(FuzzName, String)>,
    /// 루트 override (최대 16개로 제한)
    overrides: Vec<(FuzzName, String)>,
    resolutions: Vec<(FuzzName, String)>,
}

/// 충돌이 나도록 작은 이름 공간을 씀
#[derive(Arbitrary, Debug, Clone, Copy)]
enum FuzzName {
    Lodash,
    Qs,
    ScopedUtil,
    Minimist,
}

impl FuzzName {
    fn as_str(self) -> &'static str {
        match self {
            FuzzName::Lodash => "lodash",
            FuzzName::Qs => "qs",
            FuzzName::ScopedUtil => "@scope/util",
            FuzzName::Minimist => "minimist",
        }
    }
}

fn object(pairs: &[(FuzzName, String)]) -> Value {
    let mut map = Map::new();
    for (name, version) in pairs.iter().take(16) {
        map.insert(name.as_str().to_owned(), Value::String(version.clone()));
    }
    Value::Object(map)
}

fuzz_target!(|input: FuzzInput| {
    let root = json!({
        "name": "root",
        "overrides": object(&input.overrides),
        "resolutions": object(&input.resolutions),
    });
    let member = json!({ "name": "member", "dependencies": object(&input.dependencies) });

    let Ok(root) = Manifest::parse(ManifestId::new("package.json"), "package.json", &root.to_string(), true)
    else {
        return;
    };
    let Ok(member) = Manifest::parse(
        ManifestId::new("packages/member/package.json"),
        "packages/member/package.json",
        &member.to_string(),
        false,
    ) else {
        return;
    };

    let manifests = [root, member];
    let index = DependentsIndex::from_manifests(&manifests, true);
    let Ok(result) = Reconciler::new(&index).reconcile(&manifests[0]) else {
        return;
    };

    // 남은 appendix 항목은 모두 dependent가 있어야 함
    for (_, entry) in result.appendix.iter() {
        assert!(!entry.dependents.is_empty());
    }
    for orphan in &result.orphans {
        assert!(!index.declares(&orphan.package));
    }
    let _ = stage(&manifests[0], &result.edits);
});
