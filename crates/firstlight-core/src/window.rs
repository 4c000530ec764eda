//! Per-product window aggregation.
//!
//! One grouped reduction over the anchored events yields, per product, the
//! launch date, the signal-window count and the outcome-window count. The
//! same pass also tracks the latest review date in the whole dataset, which
//! feeds [`crate::horizon`].
//!
//! # Merge laws
//!
//! [`WindowAccumulator::merge`] is commutative and associative with
//! [`WindowAccumulator::default`] as identity (min over dates, sums over
//! counts). Events may therefore be split across workers in any way and the
//! partial results merged in any order: [`aggregate_partitioned`] always
//! equals [`aggregate`].

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::anchor::AnchoredEvent;

/// An inclusive range of days-from-launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub first_day: i64,
    pub last_day: i64,
}

impl DayWindow {
    #[must_use]
    pub const fn new(first_day: i64, last_day: i64) -> Self {
        Self {
            first_day,
            last_day,
        }
    }

    #[must_use]
    pub const fn contains(self, day: i64) -> bool {
        day >= self.first_day && day <= self.last_day
    }
}

/// Early-signal window: days 0 through 27 after launch.
pub const SIGNAL_WINDOW: DayWindow = DayWindow::new(0, 27);

/// Forward-outcome window: days 28 through 55 after launch.
pub const OUTCOME_WINDOW: DayWindow = DayWindow::new(28, 55);

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Mergeable per-product partial aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowAccumulator {
    launch_date: Option<NaiveDateTime>,
    reviews_28d: u32,
    future_reviews_28d: u32,
}

impl WindowAccumulator {
    /// Fold one anchored event into the accumulator.
    pub fn add(&mut self, event: &AnchoredEvent<'_>) {
        self.launch_date = min_date(self.launch_date, Some(event.review_date));
        if SIGNAL_WINDOW.contains(event.day_from_launch) {
            self.reviews_28d = self.reviews_28d.saturating_add(1);
        }
        if OUTCOME_WINDOW.contains(event.day_from_launch) {
            self.future_reviews_28d = self.future_reviews_28d.saturating_add(1);
        }
    }

    /// Combine two partial aggregates of the same product.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            launch_date: min_date(self.launch_date, other.launch_date),
            reviews_28d: self.reviews_28d.saturating_add(other.reviews_28d),
            future_reviews_28d: self
                .future_reviews_28d
                .saturating_add(other.future_reviews_28d),
        }
    }

    fn finish(self, product_id: String) -> Option<ProductAggregate> {
        Some(ProductAggregate {
            product_id,
            launch_date: self.launch_date?,
            reviews_28d: self.reviews_28d,
            future_reviews_28d: self.future_reviews_28d,
        })
    }
}

fn min_date(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn max_date(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Final per-product aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductAggregate {
    pub product_id: String,
    /// Earliest review date of the product.
    pub launch_date: NaiveDateTime,
    /// Reviews in [`SIGNAL_WINDOW`].
    pub reviews_28d: u32,
    /// Reviews in [`OUTCOME_WINDOW`].
    pub future_reviews_28d: u32,
}

/// Output of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSummary {
    /// One aggregate per distinct product, ordered by `product_id`.
    pub products: Vec<ProductAggregate>,
    /// Latest `review_date` across every event; `None` for empty input.
    pub latest_review: Option<NaiveDateTime>,
}

/// Grouped partial state for a slice of events.
#[derive(Debug, Clone, Default)]
struct Partial<'a> {
    groups: BTreeMap<&'a str, WindowAccumulator>,
    latest_review: Option<NaiveDateTime>,
}

impl<'a> Partial<'a> {
    fn fold(events: &[AnchoredEvent<'a>]) -> Self {
        let mut partial = Self::default();
        for event in events {
            partial
                .groups
                .entry(event.event.product_id.as_str())
                .or_default()
                .add(event);
            partial.latest_review = max_date(partial.latest_review, Some(event.review_date));
        }
        partial
    }

    fn merge(mut self, other: Self) -> Self {
        for (product_id, acc) in other.groups {
            let merged = self
                .groups
                .get(product_id)
                .copied()
                .unwrap_or_default()
                .merge(acc);
            self.groups.insert(product_id, merged);
        }
        self.latest_review = max_date(self.latest_review, other.latest_review);
        self
    }

    fn finish(self) -> WindowSummary {
        let products = self
            .groups
            .into_iter()
            .filter_map(|(product_id, acc)| acc.finish(product_id.to_string()))
            .collect();
        WindowSummary {
            products,
            latest_review: self.latest_review,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Aggregate all events in a single sequential pass.
#[must_use]
pub fn aggregate(events: &[AnchoredEvent<'_>]) -> WindowSummary {
    let summary = Partial::fold(events).finish();
    info!(
        events = events.len(),
        products = summary.products.len(),
        "window aggregation complete"
    );
    summary
}

/// Aggregate with `partitions` worker threads and merge the partials.
///
/// Events are split into contiguous chunks regardless of product; the merge
/// reassembles products that straddle chunk boundaries. With one partition,
/// or too few events to split, this is [`aggregate`].
#[must_use]
pub fn aggregate_partitioned(
    events: &[AnchoredEvent<'_>],
    partitions: NonZeroUsize,
) -> WindowSummary {
    let chunk_len = events.len().div_ceil(partitions.get()).max(1);
    if partitions.get() == 1 || events.len() <= chunk_len {
        return aggregate(events);
    }

    let partials: Vec<Partial<'_>> = std::thread::scope(|scope| {
        let handles: Vec<_> = events
            .chunks(chunk_len)
            .enumerate()
            .map(|(i, chunk)| {
                scope.spawn(move || {
                    let partial = Partial::fold(chunk);
                    debug!(
                        partition = i,
                        events = chunk.len(),
                        products = partial.groups.len(),
                        "partition folded"
                    );
                    partial
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(partial) => partial,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let worker_count = partials.len();
    let summary = partials
        .into_iter()
        .fold(Partial::default(), Partial::merge)
        .finish();
    info!(
        events = events.len(),
        partitions = worker_count,
        products = summary.products.len(),
        "window aggregation complete"
    );
    summary
}
