//! JSON Lines loader for review events and product metadata.
//!
//! One JSON object per line. Blank lines are skipped; anything else that is
//! not a well-formed record aborts the load with its 1-indexed line number.
//! There is no recovery mode: a partially loaded collection would make the
//! dataset horizon depend on where parsing stopped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ErrorCode;
use crate::event::review::{PRODUCT_KEY_FIELDS, ProductMetadata, ReviewEvent};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while loading an input collection.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The input file could not be opened or read.
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A line failed to parse.
    #[error("{}:{line}: {kind}", .path.display())]
    Record {
        path: PathBuf,
        line: usize,
        kind: RecordError,
    },
}

impl LoadError {
    /// Stable error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unreadable { .. } => ErrorCode::InputUnreadable,
            Self::Record { .. } => ErrorCode::MalformedRecord,
        }
    }
}

/// Why a single line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// The line is JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,
    /// The object does not match the expected row schema.
    #[error("schema mismatch: {0}")]
    Schema(String),
    /// A metadata row carries no product key.
    #[error("missing product key (expected one of: {})", PRODUCT_KEY_FIELDS.join(", "))]
    MissingProductKey,
}

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

/// The result of parsing a single input line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine<T> {
    /// A blank or whitespace-only line.
    Blank,
    /// A successfully parsed record.
    Record(T),
}

fn parse_object(line: &str) -> Result<Option<serde_json::Map<String, Value>>, RecordError> {
    let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
    if trimmed.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(RecordError::NotAnObject),
        Err(e) => Err(RecordError::InvalidJson(e.to_string())),
    }
}

/// Parse one line of the reviews collection.
///
/// # Errors
///
/// Returns [`RecordError`] if the line is not a JSON object matching
/// [`ReviewEvent`].
pub fn parse_review_line(line: &str) -> Result<ParsedLine<ReviewEvent>, RecordError> {
    parse_json_line(line)
}

/// Parse one JSON Lines record into any deserializable row type.
///
/// # Errors
///
/// Returns [`RecordError`] if the line is not a JSON object matching `T`.
pub fn parse_json_line<T: DeserializeOwned>(line: &str) -> Result<ParsedLine<T>, RecordError> {
    let Some(map) = parse_object(line)? else {
        return Ok(ParsedLine::Blank);
    };
    serde_json::from_value(Value::Object(map))
        .map(ParsedLine::Record)
        .map_err(|e| RecordError::Schema(e.to_string()))
}

/// Parse one line of the metadata collection.
///
/// # Errors
///
/// Returns [`RecordError`] if the line is not a JSON object or has no
/// product key.
pub fn parse_metadata_line(line: &str) -> Result<ParsedLine<ProductMetadata>, RecordError> {
    let Some(map) = parse_object(line)? else {
        return Ok(ParsedLine::Blank);
    };
    ProductMetadata::from_object(map)
        .map(ParsedLine::Record)
        .ok_or(RecordError::MissingProductKey)
}

/// Parse every line of `input`, skipping blanks.
///
/// # Errors
///
/// Returns `(line_number, RecordError)` for the first malformed line.
/// Line numbers are 1-indexed.
pub fn parse_lines<T>(
    input: &str,
    parse: impl Fn(&str) -> Result<ParsedLine<T>, RecordError>,
) -> Result<Vec<T>, (usize, RecordError)> {
    let mut records = Vec::new();
    for (i, line) in input.lines().enumerate() {
        match parse(line) {
            Ok(ParsedLine::Record(record)) => records.push(record),
            Ok(ParsedLine::Blank) => {}
            Err(e) => return Err((i + 1, e)),
        }
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

fn load_with<T>(
    path: &Path,
    parse: impl Fn(&str) -> Result<ParsedLine<T>, RecordError>,
) -> Result<Vec<T>, LoadError> {
    let unreadable = |source| LoadError::Unreadable {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(unreadable)?);

    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(unreadable)?;
        match parse(&line) {
            Ok(ParsedLine::Record(record)) => records.push(record),
            Ok(ParsedLine::Blank) => {}
            Err(kind) => {
                return Err(LoadError::Record {
                    path: path.to_path_buf(),
                    line: i + 1,
                    kind,
                });
            }
        }
    }
    debug!(path = %path.display(), records = records.len(), "collection read");
    Ok(records)
}

/// Load the reviews collection from a JSON Lines file.
///
/// # Errors
///
/// Returns [`LoadError`] if the file is unreadable or any line is malformed.
pub fn load_reviews(path: &Path) -> Result<Vec<ReviewEvent>, LoadError> {
    let events = load_with(path, parse_review_line)?;
    info!(path = %path.display(), events = events.len(), "reviews loaded");
    Ok(events)
}

/// Load the metadata collection from a JSON Lines file.
///
/// # Errors
///
/// Returns [`LoadError`] if the file is unreadable or any line is malformed.
pub fn load_metadata(path: &Path) -> Result<Vec<ProductMetadata>, LoadError> {
    let rows = load_with(path, parse_metadata_line)?;
    info!(path = %path.display(), rows = rows.len(), "metadata loaded");
    Ok(rows)
}
