#![no_main]

//! Fuzz target for the filename grammar.
//!
//! Accepted names must canonicalize to a stable form that parses to the same
//! entities, and rejected names must map to a filename-class code.

use libfuzzer_sys::fuzz_target;
use prism_domain::grammar::{canonicalize, known_modalities, parse};
use prism_types::issue::CodeClass;

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };
    for modality in known_modalities() {
        match parse(name, modality) {
            Ok(m) => {
                let canonical = canonicalize(&m);
                assert!(canonical.eq_ignore_ascii_case(name));
                let again = parse(&canonical, modality).expect("canonical name parses");
                assert_eq!(again.entities, m.entities);
                assert_eq!(canonicalize(&again), canonical);
            }
            Err(e) => {
                let class = e.code().class();
                assert!(
                    class == CodeClass::Filename || class == CodeClass::Structure,
                    "unexpected class for {name:?}: {class:?}"
                );
            }
        }
    }
});
