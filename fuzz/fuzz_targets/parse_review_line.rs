#![no_main]

use firstlight_core::anchor::review_date;
use firstlight_core::event::{ParsedLine, parse_review_line};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(ParsedLine::Record(event)) = parse_review_line(line) {
        // Any accepted timestamp must convert or be rejected, never panic.
        let _ = review_date(event.timestamp);
    }
});
