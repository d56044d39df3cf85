#![no_main]

//! Fuzz target for `prism.scan.v1` / `prism.fix.v1` report parsing.

use libfuzzer_sys::fuzz_target;
use prism_types::fix::parse_action_line;
use prism_types::wire::{FixReportV1, ScanReportV1};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(report) = serde_json::from_str::<ScanReportV1>(s) {
        let _ = report.issues();
    }
    let _ = serde_json::from_str::<FixReportV1>(s);

    for line in s.lines() {
        if let Ok(parsed) = parse_action_line(line) {
            let again = prism_types::fix::format_action_line(
                parsed.code,
                parsed.verb,
                parsed.target.as_str(),
            );
            assert_eq!(parse_action_line(&again).ok(), Some(parsed));
        }
    }
});
