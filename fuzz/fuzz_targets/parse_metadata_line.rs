#![no_main]

use firstlight_core::event::{ParsedLine, parse_metadata_line};
use firstlight_core::keep::DROPPED_METADATA_FIELDS;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(ParsedLine::Record(meta)) = parse_metadata_line(line) {
        let id = meta.product_id().to_string();
        let trimmed = meta.without_fields(&DROPPED_METADATA_FIELDS);
        assert_eq!(trimmed.product_id(), id);
    }
});
