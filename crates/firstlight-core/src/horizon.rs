//! Dataset horizon: the one global value every product is judged against.
//!
//! `dataset_end` is the latest review date over the whole input. It is
//! resolved once, before any classification, and handed to the classifier as
//! an immutable [`Horizon`]. Nothing recomputes it per product or per
//! partition.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::info;

use crate::error::ErrorCode;
use crate::window::OUTCOME_WINDOW;

/// Days that must have elapsed between launch and `dataset_end` for the
/// outcome window to be fully observed.
pub const OBSERVATION_DAYS: u64 = OUTCOME_WINDOW.last_day.unsigned_abs();

/// Raised when there is nothing to derive a horizon from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot resolve dataset horizon: no review events")]
pub struct EmptyDatasetError;

impl EmptyDatasetError {
    #[must_use]
    pub const fn code(self) -> ErrorCode {
        ErrorCode::EmptyEventSet
    }
}

/// The resolved dataset end and the observability cutoff derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Horizon {
    dataset_end: NaiveDateTime,
    cutoff_date: NaiveDate,
}

impl Horizon {
    /// Build a horizon from an already-known dataset end.
    #[must_use]
    pub fn new(dataset_end: NaiveDateTime) -> Self {
        let cutoff_date = dataset_end
            .date()
            .checked_sub_days(Days::new(OBSERVATION_DAYS))
            .unwrap_or(NaiveDate::MIN);
        Self {
            dataset_end,
            cutoff_date,
        }
    }

    /// Latest review date in the dataset.
    #[must_use]
    pub const fn dataset_end(&self) -> NaiveDateTime {
        self.dataset_end
    }

    /// `dataset_end − 55 days`, as a calendar date.
    #[must_use]
    pub const fn cutoff_date(&self) -> NaiveDate {
        self.cutoff_date
    }

    /// Whether a product launched at `launch_date` has a fully observed
    /// outcome window.
    ///
    /// The launch timestamp is compared against midnight of the cutoff
    /// date: a launch at exactly 00:00 on the cutoff date is observable, any
    /// later time that day is not.
    #[must_use]
    pub fn is_observable(&self, launch_date: NaiveDateTime) -> bool {
        launch_date <= self.cutoff_date.and_time(NaiveTime::MIN)
    }
}

/// Resolve the horizon from the latest review date of an aggregation pass.
///
/// # Errors
///
/// Returns [`EmptyDatasetError`] when there were no events.
pub fn resolve(latest_review: Option<NaiveDateTime>) -> Result<Horizon, EmptyDatasetError> {
    let horizon = Horizon::new(latest_review.ok_or(EmptyDatasetError)?);
    info!(
        dataset_end = %horizon.dataset_end,
        cutoff_date = %horizon.cutoff_date,
        "dataset horizon resolved"
    );
    Ok(horizon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 30, 0))
            .expect("valid date")
    }

    #[test]
    fn observation_days_matches_outcome_window_end() {
        assert_eq!(OBSERVATION_DAYS, 55);
    }

    #[test]
    fn cutoff_is_55_calendar_days_before_end() {
        let horizon = Horizon::new(at(2023, 3, 31, 17));
        assert_eq!(
            horizon.cutoff_date(),
            NaiveDate::from_ymd_opt(2023, 2, 4).expect("valid")
        );
    }

    #[test]
    fn launch_at_cutoff_midnight_is_observable() {
        let horizon = Horizon::new(at(2023, 3, 31, 17));
        let midnight = NaiveDate::from_ymd_opt(2023, 2, 4)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date");
        assert!(horizon.is_observable(midnight));
        assert!(horizon.is_observable(at(2023, 2, 3, 23)));
    }

    #[test]
    fn launch_later_on_cutoff_date_is_not_observable() {
        let horizon = Horizon::new(at(2023, 3, 31, 17));
        let one_second_past = NaiveDate::from_ymd_opt(2023, 2, 4)
            .and_then(|d| d.and_hms_opt(0, 0, 1))
            .expect("valid date");
        assert!(!horizon.is_observable(one_second_past));
        assert!(!horizon.is_observable(at(2023, 2, 4, 23)));
        assert!(!horizon.is_observable(at(2023, 2, 5, 0)));
    }

    #[test]
    fn empty_dataset_has_no_horizon() {
        assert_eq!(resolve(None), Err(EmptyDatasetError));
        assert_eq!(EmptyDatasetError.code(), ErrorCode::EmptyEventSet);
    }

    #[test]
    fn resolve_keeps_the_full_end_timestamp() {
        let end = at(2022, 12, 1, 4);
        let horizon = resolve(Some(end)).expect("resolve");
        assert_eq!(horizon.dataset_end(), end);
    }
}
