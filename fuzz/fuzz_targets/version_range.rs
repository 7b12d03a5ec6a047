#![no_main]

use libfuzzer_sys::fuzz_target;
use pinkeeper_security::version;

fuzz_target!(|data: (&str, &str)| {
    let (range, other) = data;
    if let Some(bound) = version::lower_bound(range) {
        assert!(!bound.is_empty());
    }
    let _ = version::fixed_from_vulnerable_range(range);
    let _ = version::compare(range, other);
    let _ = version::satisfies_minimum(range, other);
});
