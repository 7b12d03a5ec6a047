#![no_main]

use libfuzzer_sys::fuzz_target;
use pinkeeper_manifest::{Manifest, ManifestId};

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data)
        && let Ok(manifest) = Manifest::parse(
            ManifestId::new("package.json"),
            "package.json",
            content,
            true,
        )
    {
        // 렌더링 결과는 다시 파싱되어야 함
        let rendered = manifest
            .render(manifest.value())
            .expect("parsed manifest must render");
        let reparsed = Manifest::parse(
            ManifestId::new("package.json"),
            "package.json",
            &rendered,
            true,
        )
        .expect("rendered manifest must parse");
        assert_eq!(reparsed.value(), manifest.value());
        let _ = manifest.workspaces();
        let _ = manifest.namespace_dep_paths();
    }
});
