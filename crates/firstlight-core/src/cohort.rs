//! Cohort classification: eligibility, observability, traction, keep rule.
//!
//! [`classify`] is a pure function of one product's aggregate and the
//! dataset [`Horizon`]. It never fails: every product gets eligibility,
//! observability and keep determinations, and products whose outcome window
//! is not yet observable get an *unknown* traction label instead of a
//! defaulted boolean.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::horizon::Horizon;
use crate::window::ProductAggregate;

/// Minimum signal-window reviews for a product to be eligible.
pub const ELIGIBILITY_MIN_REVIEWS: u32 = 3;

/// Forward traction of an observable product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Traction {
    /// At least one review in the outcome window.
    Gained,
    /// No reviews in the outcome window.
    Stalled,
}

/// Labels for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCohort {
    pub product_id: String,
    pub launch_date: NaiveDateTime,
    pub reviews_28d: u32,
    pub future_reviews_28d: u32,
    pub dataset_end: NaiveDateTime,
    pub observable_55d: bool,
    pub eligible: bool,
    /// `None` when the outcome window is not observable.
    pub traction: Option<Traction>,
    pub keep_product: bool,
    pub launch_year: i32,
}

impl ProductCohort {
    /// `Some(true)` for gained traction, `Some(false)` for stalled, `None`
    /// when unobservable.
    #[must_use]
    pub fn traction_flag(&self) -> Option<bool> {
        self.traction.map(|t| t == Traction::Gained)
    }

    /// Complement of [`Self::traction_flag`] under the same observability gate.
    #[must_use]
    pub fn low_traction_flag(&self) -> Option<bool> {
        self.traction.map(|t| t == Traction::Stalled)
    }

    /// Flatten into the `product_index` row layout.
    #[must_use]
    pub fn to_row(&self) -> ProductIndexRow {
        ProductIndexRow {
            product_id: self.product_id.clone(),
            launch_date: self.launch_date,
            reviews_28d: self.reviews_28d,
            future_reviews_28d: self.future_reviews_28d,
            dataset_end: self.dataset_end,
            observable_55d: self.observable_55d,
            eligible: self.eligible,
            traction_flag: self.traction_flag(),
            low_traction_flag: self.low_traction_flag(),
            keep_product: self.keep_product,
            launch_year: self.launch_year,
        }
    }
}

/// One `product_index` row as written to disk.
///
/// The traction flags serialize as `true`, `false` or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductIndexRow {
    pub product_id: String,
    pub launch_date: NaiveDateTime,
    pub reviews_28d: u32,
    pub future_reviews_28d: u32,
    pub dataset_end: NaiveDateTime,
    pub observable_55d: bool,
    pub eligible: bool,
    pub traction_flag: Option<bool>,
    pub low_traction_flag: Option<bool>,
    pub keep_product: bool,
    pub launch_year: i32,
}

/// Classify one product against the dataset horizon.
#[must_use]
pub fn classify(aggregate: &ProductAggregate, horizon: &Horizon) -> ProductCohort {
    let observable_55d = horizon.is_observable(aggregate.launch_date);
    let eligible = aggregate.reviews_28d >= ELIGIBILITY_MIN_REVIEWS;
    let traction = observable_55d.then_some(if aggregate.future_reviews_28d > 0 {
        Traction::Gained
    } else {
        Traction::Stalled
    });

    ProductCohort {
        product_id: aggregate.product_id.clone(),
        launch_date: aggregate.launch_date,
        reviews_28d: aggregate.reviews_28d,
        future_reviews_28d: aggregate.future_reviews_28d,
        dataset_end: horizon.dataset_end(),
        observable_55d,
        eligible,
        traction,
        keep_product: eligible && observable_55d,
        launch_year: aggregate.launch_date.year(),
    }
}

/// Classify every product. Output order follows input order.
#[must_use]
pub fn classify_all(aggregates: &[ProductAggregate], horizon: &Horizon) -> Vec<ProductCohort> {
    let cohorts: Vec<_> = aggregates.iter().map(|a| classify(a, horizon)).collect();
    let kept = cohorts.iter().filter(|c| c.keep_product).count();
    let observable = cohorts.iter().filter(|c| c.observable_55d).count();
    let eligible = cohorts.iter().filter(|c| c.eligible).count();
    info!(
        products = cohorts.len(),
        eligible, observable, kept, "cohort classification complete"
    );
    cohorts
}
