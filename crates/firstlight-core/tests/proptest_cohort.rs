use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use chrono::{Days, NaiveTime};
use firstlight_core::anchor::anchor_events;
use firstlight_core::event::{ProductMetadata, ReviewEvent};
use firstlight_core::pipeline::{RunOptions, curate};
use firstlight_core::timing::StageTimer;
use firstlight_core::window::{aggregate, aggregate_partitioned};
use proptest::prelude::*;
use serde_json::{Map, Value};

#[path = "generators.rs"]
mod generators;
use generators::*;

fn metadata_for(events: &[ReviewEvent]) -> Vec<ProductMetadata> {
    let ids: BTreeSet<&str> = events.iter().map(|e| e.product_id.as_str()).collect();
    ids.into_iter()
        .map(|id| {
            let mut fields = Map::new();
            fields.insert("product_id".into(), Value::String(id.to_string()));
            fields.insert("images".into(), Value::Array(Vec::new()));
            ProductMetadata::from_object(fields).expect("keyed")
        })
        .collect()
}

fn one_partition() -> RunOptions {
    RunOptions {
        partitions: NonZeroUsize::MIN,
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn launch_is_the_product_minimum(events in arb_events()) {
        let anchored = anchor_events(&events).expect("anchor");
        let mut minimum: BTreeMap<&str, i64> = BTreeMap::new();
        for e in &events {
            let ts = e.timestamp.expect("generated");
            minimum
                .entry(e.product_id.as_str())
                .and_modify(|m| *m = (*m).min(ts))
                .or_insert(ts);
        }
        for a in &anchored {
            prop_assert_eq!(a.launch_date, date_of(minimum[a.product_id()]));
            prop_assert!(a.review_date >= a.launch_date);
            prop_assert!(a.day_from_launch >= 0);
            prop_assert_eq!(a.day_from_launch, calendar_days(a.review_date, a.launch_date));
        }
    }

    #[test]
    fn window_counts_match_a_direct_recount(events in arb_events()) {
        let anchored = anchor_events(&events).expect("anchor");
        let summary = aggregate(&anchored);
        for product in &summary.products {
            let days: Vec<i64> = events
                .iter()
                .filter(|e| e.product_id == product.product_id)
                .map(|e| {
                    let date = date_of(e.timestamp.expect("generated"));
                    calendar_days(date, product.launch_date)
                })
                .collect();
            let signal = days.iter().filter(|d| (0..=27).contains(*d)).count();
            let outcome = days.iter().filter(|d| (28..=55).contains(*d)).count();
            prop_assert_eq!(product.reviews_28d as usize, signal);
            prop_assert_eq!(product.future_reviews_28d as usize, outcome);
        }
    }

    #[test]
    fn labels_follow_their_definitions(events in arb_dense_events()) {
        let curation = curate(&events, &[], one_partition(), &mut StageTimer::new())
            .expect("curate");
        let dataset_end = events
            .iter()
            .map(|e| date_of(e.timestamp.expect("generated")))
            .max()
            .expect("non-empty");
        let cutoff = dataset_end.date().checked_sub_days(Days::new(55)).expect("in range");

        for c in &curation.cohorts {
            prop_assert_eq!(c.dataset_end, dataset_end);
            prop_assert_eq!(c.observable_55d, c.launch_date <= cutoff.and_time(NaiveTime::MIN));
            prop_assert_eq!(c.eligible, c.reviews_28d >= 3);
            prop_assert_eq!(c.keep_product, c.eligible && c.observable_55d);
            if c.observable_55d {
                let gained = c.traction_flag().expect("observable");
                let stalled = c.low_traction_flag().expect("observable");
                prop_assert!(gained ^ stalled);
                prop_assert_eq!(gained, c.future_reviews_28d > 0);
            } else {
                prop_assert_eq!(c.traction_flag(), None);
                prop_assert_eq!(c.low_traction_flag(), None);
            }
        }
    }

    #[test]
    fn filtered_outputs_cover_exactly_the_kept_set(events in arb_dense_events()) {
        let metadata = metadata_for(&events);
        let curation = curate(&events, &metadata, one_partition(), &mut StageTimer::new())
            .expect("curate");

        let kept: BTreeSet<&str> = curation
            .cohorts
            .iter()
            .filter(|c| c.keep_product)
            .map(|c| c.product_id.as_str())
            .collect();
        let in_reviews: BTreeSet<&str> =
            curation.reviews.iter().map(|r| r.product_id.as_str()).collect();
        let in_meta: BTreeSet<&str> =
            curation.metadata.iter().map(ProductMetadata::product_id).collect();

        prop_assert_eq!(&in_reviews, &kept);
        prop_assert_eq!(&in_meta, &kept);
        prop_assert_eq!(curation.qc.metadata_gaps, 0);
        prop_assert!(curation.metadata.iter().all(|m| !m.fields().contains_key("images")));
    }

    #[test]
    fn partitioned_aggregation_matches_sequential(
        events in arb_events(),
        partitions in 1_usize..9,
    ) {
        let anchored = anchor_events(&events).expect("anchor");
        let n = NonZeroUsize::new(partitions).expect("non-zero");
        prop_assert_eq!(aggregate_partitioned(&anchored, n), aggregate(&anchored));
    }

    #[test]
    fn product_index_ignores_input_order(
        (events, shuffled) in arb_dense_events()
            .prop_flat_map(|e| (Just(e.clone()), Just(e).prop_shuffle())),
    ) {
        let a = curate(&events, &[], one_partition(), &mut StageTimer::new()).expect("curate");
        let b = curate(&shuffled, &[], one_partition(), &mut StageTimer::new()).expect("curate");
        let encode = |rows: Vec<_>| serde_json::to_vec(&rows).expect("encode");
        prop_assert_eq!(encode(a.index_rows()), encode(b.index_rows()));
        prop_assert_eq!(a.qc, b.qc);
    }
}
