#![no_main]

use libfuzzer_sys::fuzz_target;
use pinkeeper_manifest::overrides::parse_overrides;
use pinkeeper_manifest::{Manifest, ManifestId};

fuzz_target!(|data: &[u8]| {
    let Ok(content) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(manifest) = Manifest::parse(ManifestId::new("package.json"), "package.json", content, true)
    else {
        return;
    };
    if let Ok(entries) = parse_overrides(&manifest) {
        for entry in entries {
            assert!(!entry.location.is_empty(), "entry must point at a key");
            assert!(manifest.has_mechanism(entry.mechanism));
        }
    }
});
