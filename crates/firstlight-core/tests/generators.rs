#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use firstlight_core::event::ReviewEvent;
use proptest::prelude::*;

pub const DAY_MS: i64 = 86_400_000;
/// 2020-01-01T00:00:00Z
pub const BASE_MS: i64 = 1_577_836_800_000;

pub fn review_at(product: &str, timestamp_ms: i64) -> ReviewEvent {
    ReviewEvent {
        product_id: product.to_string(),
        item_id: format!("{product}-variant"),
        rating: 4.0,
        text: "fine".to_string(),
        title: Some("ok".to_string()),
        helpful_vote: 0,
        verified_purchase: true,
        timestamp: Some(timestamp_ms),
        user_id: None,
    }
}

pub fn review_on_day(product: &str, day: i64) -> ReviewEvent {
    review_at(product, BASE_MS + day * DAY_MS)
}

/// Calendar timestamp the pipeline derives from a millisecond timestamp.
pub fn date_of(timestamp_ms: i64) -> NaiveDateTime {
    DateTime::from_timestamp(timestamp_ms / 1_000, 0)
        .map(|dt| dt.naive_utc())
        .expect("timestamp in range")
}

pub fn calendar_days(later: NaiveDateTime, earlier: NaiveDateTime) -> i64 {
    (later.date() - earlier.date()).num_days()
}

pub fn base_date() -> NaiveDate {
    date_of(BASE_MS).date()
}

/// Events over a handful of products, spread across ~400 days with
/// sub-day jitter so calendar-day boundaries get exercised.
pub fn arb_events() -> impl Strategy<Value = Vec<ReviewEvent>> + Clone {
    prop::collection::vec((0_u8..8, 0_i64..400 * DAY_MS), 1..160).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(product, offset)| review_at(&format!("p{product}"), BASE_MS + offset))
            .collect()
    })
}

/// Events clustered near their product's launch so that products clear the
/// eligibility threshold often.
pub fn arb_dense_events() -> impl Strategy<Value = Vec<ReviewEvent>> + Clone {
    prop::collection::vec((0_u8..5, 0_i64..70), 1..120).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(product, offset_day)| {
                let first_possible_day = i64::from(product) * 60;
                review_on_day(&format!("d{product}"), first_possible_day + offset_day)
            })
            .collect()
    })
}
