#![no_main]

//! Fuzz target for sidecar content checks.
//!
//! Arbitrary bytes are checked against every bundled schema; missing
//! required fields and violations must be reported, never panic.

use libfuzzer_sys::fuzz_target;
use prism_schema::SchemaRegistry;
use std::sync::OnceLock;

fn registry() -> &'static SchemaRegistry {
    static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();
    REGISTRY.get_or_init(SchemaRegistry::new)
}

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(doc) = serde_json::from_str::<serde_json::Value>(s) else {
        return;
    };
    let Ok(spec) = registry().load("stable") else {
        return;
    };
    for name in spec.modalities().map(str::to_string).collect::<Vec<_>>() {
        let Some(schema) = spec.schema(&name) else {
            continue;
        };
        if let Some(map) = doc.as_object() {
            for field in schema.missing_required(map) {
                assert!(!map.contains_key(&field));
            }
        }
        let _ = schema.violations(&doc);
    }
});
