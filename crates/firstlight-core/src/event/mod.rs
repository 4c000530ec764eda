//! Input records: review events and product metadata.

pub mod loader;
pub mod review;

pub use loader::{
    LoadError, ParsedLine, RecordError, load_metadata, load_reviews, parse_json_line,
    parse_lines, parse_metadata_line, parse_review_line,
};
pub use review::{ProductMetadata, ReviewEvent};
