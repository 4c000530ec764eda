//! Time anchoring: review dates, launch dates, and day offsets.
//!
//! # Timestamp scale
//!
//! Raw `timestamp` values are epoch **milliseconds**. The calendar timestamp
//! is `timestamp / 1_000` interpreted as whole UTC seconds (sub-second
//! precision is truncated). The scale is fixed for the whole dataset.
//!
//! A value outside the plausible capture window (1990-01-01 up to
//! 2100-01-01) after conversion is reported as a scale mismatch rather than
//! accepted: seconds-scale input lands in January 1970 and microsecond-scale
//! input lands tens of thousands of years out, and either would quietly
//! corrupt every day offset computed from it.
//!
//! # Anchoring
//!
//! [`anchor_events`] materializes one [`AnchoredEvent`] per input event.
//! Every later stage reads that single materialization, so the launch date
//! and day offsets seen by the aggregator are the ones written to
//! `reviews_filtered`.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime};
use tracing::{debug, info};

use crate::error::ErrorCode;
use crate::event::ReviewEvent;

/// Raw timestamp units per second (milliseconds).
pub const TIMESTAMP_UNITS_PER_SECOND: i64 = 1_000;

/// 1990-01-01T00:00:00Z in epoch seconds.
pub const EARLIEST_PLAUSIBLE_SECS: i64 = 631_152_000;

/// 2100-01-01T00:00:00Z in epoch seconds.
pub const LATEST_PLAUSIBLE_SECS: i64 = 4_102_444_800;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single timestamp could not be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("timestamp is null")]
    Null,
    #[error("timestamp {0} is negative")]
    Negative(i64),
    #[error(
        "timestamp {timestamp} converts to epoch second {seconds}, outside 1990..2100; \
         expected epoch milliseconds"
    )]
    Scale { timestamp: i64, seconds: i64 },
}

/// A timestamp failure tied to the event that carried it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event #{index} (product {product_id}): {source}")]
pub struct AnchorError {
    /// 0-based position of the event in the input collection.
    pub index: usize,
    pub product_id: String,
    #[source]
    pub source: TimestampError,
}

impl AnchorError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self.source {
            TimestampError::Null | TimestampError::Negative(_) => ErrorCode::MalformedTimestamp,
            TimestampError::Scale { .. } => ErrorCode::TimestampScale,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn checked_timestamp(timestamp: Option<i64>) -> Result<i64, TimestampError> {
    match timestamp {
        None => Err(TimestampError::Null),
        Some(ts) if ts < 0 => Err(TimestampError::Negative(ts)),
        Some(ts) => Ok(ts),
    }
}

fn date_from_timestamp(timestamp: i64) -> Result<NaiveDateTime, TimestampError> {
    let seconds = timestamp / TIMESTAMP_UNITS_PER_SECOND;
    let scale = TimestampError::Scale { timestamp, seconds };
    if !(EARLIEST_PLAUSIBLE_SECS..=LATEST_PLAUSIBLE_SECS).contains(&seconds) {
        return Err(scale);
    }
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.naive_utc())
        .ok_or(scale)
}

/// Convert a raw epoch-millisecond timestamp into a UTC calendar timestamp.
///
/// # Errors
///
/// Returns [`TimestampError`] for null, negative, or implausibly scaled input.
pub fn review_date(timestamp: Option<i64>) -> Result<NaiveDateTime, TimestampError> {
    date_from_timestamp(checked_timestamp(timestamp)?)
}

/// Whole calendar days from `launch` to `review` (`review − launch`).
#[must_use]
pub fn day_offset(review: NaiveDateTime, launch: NaiveDateTime) -> i64 {
    (review.date() - launch.date()).num_days()
}

// ---------------------------------------------------------------------------
// AnchoredEvent
// ---------------------------------------------------------------------------

/// A review event with its derived temporal fields.
///
/// Borrows the source event; the source is never modified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchoredEvent<'a> {
    pub event: &'a ReviewEvent,
    /// The validated raw timestamp.
    pub timestamp: i64,
    pub review_date: NaiveDateTime,
    /// Earliest `review_date` across all events of the same product.
    pub launch_date: NaiveDateTime,
    /// Calendar days since `launch_date`; never negative.
    pub day_from_launch: i64,
}

impl AnchoredEvent<'_> {
    #[must_use]
    pub fn product_id(&self) -> &str {
        &self.event.product_id
    }
}

/// Derive review dates, per-product launch dates and day offsets.
///
/// # Errors
///
/// Returns [`AnchorError`] for the first event whose timestamp is null,
/// negative, or out of scale. Nothing is returned on failure.
pub fn anchor_events(events: &[ReviewEvent]) -> Result<Vec<AnchoredEvent<'_>>, AnchorError> {
    let dated = events
        .iter()
        .enumerate()
        .map(|(index, event)| {
            checked_timestamp(event.timestamp)
                .and_then(|ts| date_from_timestamp(ts).map(|date| (ts, date)))
                .map_err(|source| AnchorError {
                    index,
                    product_id: event.product_id.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut launches: HashMap<&str, NaiveDateTime> = HashMap::new();
    for (event, &(_, date)) in events.iter().zip(&dated) {
        launches
            .entry(event.product_id.as_str())
            .and_modify(|launch| {
                if date < *launch {
                    *launch = date;
                }
            })
            .or_insert(date);
    }
    debug!(products = launches.len(), "launch dates resolved");

    let anchored: Vec<AnchoredEvent<'_>> = events
        .iter()
        .zip(dated)
        .map(|(event, (timestamp, review_date))| {
            let launch_date = launches
                .get(event.product_id.as_str())
                .copied()
                .unwrap_or(review_date);
            AnchoredEvent {
                event,
                timestamp,
                review_date,
                launch_date,
                day_from_launch: day_offset(review_date, launch_date),
            }
        })
        .collect();

    info!(
        events = anchored.len(),
        products = launches.len(),
        "events anchored"
    );
    Ok(anchored)
}
