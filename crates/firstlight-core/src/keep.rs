//! Keep-rule filter.
//!
//! The kept product set is derived once from the classified cohorts and
//! applied to both the event-level and the metadata datasets as an inner
//! equi-join on `product_id`. Both outputs therefore name only kept
//! products. Every kept product has at least one event, so the filtered
//! reviews cover the kept set exactly; metadata may have gaps, which the
//! verifier reports.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::anchor::AnchoredEvent;
use crate::cohort::ProductCohort;
use crate::event::ProductMetadata;

/// Metadata fields removed from `meta_clean_filtered`.
///
/// Media URLs (`images`, `videos`), a field that is empty across the whole
/// source catalogue (`bought_together`), and a category field that is not
/// reliably populated at product grain (`categories`).
pub const DROPPED_METADATA_FIELDS: [&str; 4] = ["images", "videos", "bought_together", "categories"];

/// Products that passed the keep rule. Duplicate-free by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeptProducts {
    ids: BTreeSet<String>,
}

impl KeptProducts {
    #[must_use]
    pub fn from_cohorts(cohorts: &[ProductCohort]) -> Self {
        let ids = cohorts
            .iter()
            .filter(|c| c.keep_product)
            .map(|c| c.product_id.clone())
            .collect();
        Self { ids }
    }

    #[must_use]
    pub fn contains(&self, product_id: &str) -> bool {
        self.ids.contains(product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

/// One `reviews_filtered` row.
///
/// Column order is fixed. `user_id` is emitted only when the source event
/// carried one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRow {
    pub product_id: String,
    pub item_id: String,
    pub rating: f64,
    pub text: String,
    pub title: Option<String>,
    pub helpful_vote: u32,
    pub verified_purchase: bool,
    pub timestamp: i64,
    pub review_date: NaiveDateTime,
    pub launch_date: NaiveDateTime,
    pub day_from_launch: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl From<&AnchoredEvent<'_>> for ReviewRow {
    fn from(anchored: &AnchoredEvent<'_>) -> Self {
        let event = anchored.event;
        Self {
            product_id: event.product_id.clone(),
            item_id: event.item_id.clone(),
            rating: event.rating,
            text: event.text.clone(),
            title: event.title.clone(),
            helpful_vote: event.helpful_vote,
            verified_purchase: event.verified_purchase,
            timestamp: anchored.timestamp,
            review_date: anchored.review_date,
            launch_date: anchored.launch_date,
            day_from_launch: anchored.day_from_launch,
            user_id: event.user_id.clone(),
        }
    }
}

/// Events of kept products, projected to [`ReviewRow`]. Input order is kept.
#[must_use]
pub fn filter_reviews(events: &[AnchoredEvent<'_>], kept: &KeptProducts) -> Vec<ReviewRow> {
    let rows: Vec<ReviewRow> = events
        .iter()
        .filter(|e| kept.contains(e.product_id()))
        .map(ReviewRow::from)
        .collect();
    info!(
        events_in = events.len(),
        events_kept = rows.len(),
        "reviews filtered"
    );
    rows
}

/// Metadata rows of kept products with [`DROPPED_METADATA_FIELDS`] removed.
#[must_use]
pub fn filter_metadata(metadata: &[ProductMetadata], kept: &KeptProducts) -> Vec<ProductMetadata> {
    let rows: Vec<_> = metadata
        .iter()
        .filter(|m| kept.contains(m.product_id()))
        .map(|m| m.without_fields(&DROPPED_METADATA_FIELDS))
        .collect();
    info!(
        rows_in = metadata.len(),
        rows_kept = rows.len(),
        "metadata filtered"
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::anchor_events;
    use crate::cohort::classify_all;
    use crate::event::ReviewEvent;
    use crate::horizon;
    use crate::window::aggregate;
    use serde_json::{Value, json};

    const DAY_MS: i64 = 86_400_000;
    const BASE_MS: i64 = 1_577_836_800_000; // 2020-01-01

    fn review(product: &str, day: i64, user: Option<&str>) -> ReviewEvent {
        ReviewEvent {
            product_id: product.into(),
            item_id: format!("{product}-1"),
            rating: 3.0,
            text: "t".into(),
            title: Some("title".into()),
            helpful_vote: 1,
            verified_purchase: true,
            timestamp: Some(BASE_MS + day * DAY_MS),
            user_id: user.map(str::to_string),
        }
    }

    fn meta(product: &str) -> ProductMetadata {
        let Value::Object(fields) = json!({
            "parent_asin": product,
            "title": "Product",
            "images": [{"large": "http://img"}],
            "videos": [],
            "bought_together": null,
            "categories": [],
            "store": "Acme"
        }) else {
            unreachable!()
        };
        ProductMetadata::from_object(fields).expect("keyed")
    }

    fn fixture() -> Vec<ReviewEvent> {
        let mut events = Vec::new();
        // kept: 3 early reviews, launches day 0
        for d in [0, 1, 2] {
            events.push(review("kept", d, Some("u")));
        }
        // thin: only 2 early reviews
        events.push(review("thin", 0, None));
        events.push(review("thin", 3, None));
        // late: launches near the end, never observable
        for d in [190, 191, 192] {
            events.push(review("late", d, None));
        }
        events.push(review("anchor-end", 200, None));
        events
    }

    #[test]
    fn only_kept_products_survive_in_both_outputs() {
        let events = fixture();
        let anchored = anchor_events(&events).expect("anchor");
        let summary = aggregate(&anchored);
        let horizon = horizon::resolve(summary.latest_review).expect("horizon");
        let cohorts = classify_all(&summary.products, &horizon);
        let kept = KeptProducts::from_cohorts(&cohorts);

        assert_eq!(kept.iter().collect::<Vec<_>>(), ["kept"]);

        let reviews = filter_reviews(&anchored, &kept);
        assert_eq!(reviews.len(), 3);
        assert!(reviews.iter().all(|r| r.product_id == "kept"));

        let metadata = vec![meta("kept"), meta("thin"), meta("unknown")];
        let clean = filter_metadata(&metadata, &kept);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].product_id(), "kept");
    }

    #[test]
    fn dropped_metadata_fields_are_removed() {
        let kept = KeptProducts {
            ids: BTreeSet::from(["p".to_string()]),
        };
        let clean = filter_metadata(&[meta("p")], &kept);
        for field in DROPPED_METADATA_FIELDS {
            assert!(!clean[0].fields().contains_key(field), "{field} should be dropped");
        }
        assert_eq!(clean[0].fields()["store"], "Acme");
        assert_eq!(clean[0].fields()["title"], "Product");
        assert_eq!(clean[0].fields()["parent_asin"], "p");
    }

    #[test]
    fn review_row_carries_derived_fields_and_column_order() {
        let events = vec![review("p", 0, None), review("p", 4, Some("u9"))];
        let anchored = anchor_events(&events).expect("anchor");
        let row = ReviewRow::from(&anchored[1]);
        assert_eq!(row.day_from_launch, 4);
        assert_eq!(row.launch_date, anchored[0].review_date);

        let text = serde_json::to_string(&row).expect("serialize");
        let keys: Vec<_> = [
            "product_id",
            "item_id",
            "rating",
            "text",
            "title",
            "helpful_vote",
            "verified_purchase",
            "timestamp",
            "review_date",
            "launch_date",
            "day_from_launch",
            "user_id",
        ]
        .iter()
        .map(|k| text.find(&format!("\"{k}\":")).expect(k))
        .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "{text}");
    }

    #[test]
    fn absent_user_id_is_not_emitted() {
        let events = vec![review("p", 0, None)];
        let anchored = anchor_events(&events).expect("anchor");
        let json = serde_json::to_value(ReviewRow::from(&anchored[0])).expect("serialize");
        assert!(json.get("user_id").is_none());
        assert!(json.get("title").is_some());
    }

    #[test]
    fn empty_keep_set_filters_everything() {
        let events = fixture();
        let anchored = anchor_events(&events).expect("anchor");
        let kept = KeptProducts::default();
        assert!(kept.is_empty());
        assert!(filter_reviews(&anchored, &kept).is_empty());
        assert!(filter_metadata(&[meta("kept")], &kept).is_empty());
    }
}
