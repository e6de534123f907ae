#![no_main]

use libfuzzer_sys::fuzz_target;
use rawrepo_marcx::{merge, FieldRules};

// Arbitrary bytes split into a common and an enrichment document. Merging
// must return a result, never panic.
fuzz_target!(|data: &[u8]| {
    let split = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let (common, rest) = data.split_at(split);
    let local = rest.get(1..).unwrap_or_default();
    let rules = FieldRules::danmarc2();

    if let Ok(merged) = merge(common, local, false, &rules) {
        let _ = rawrepo_marcx::decode_record(&merged);
    }
});
