//! Consistency checks and the QC report for a curated dataset.
//!
//! The checks run against the row types that are written to disk, so the
//! same code validates a fresh run before commit and an existing output
//! directory (see [`artifacts`]).

pub mod artifacts;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cohort::ProductIndexRow;
use crate::error::ErrorCode;
use crate::event::ProductMetadata;
use crate::keep::ReviewRow;
use crate::stats::nearest_rank;

/// Maximum number of offending keys carried in an error or report.
pub const SAMPLE_LIMIT: usize = 5;

/// Verification error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// A `product_id` appears on more than one product index row.
    #[error("product index has {count} duplicated product_id value(s), e.g. {sample:?}")]
    DuplicateProductKey { count: usize, sample: Vec<String> },

    /// A filtered dataset names products outside the keep set.
    #[error("{dataset} contains {count} product(s) outside the keep set, e.g. {sample:?}")]
    UnexpectedProducts {
        dataset: &'static str,
        count: usize,
        sample: Vec<String>,
    },

    /// A kept product has no rows in a dataset that must cover it.
    #[error("{dataset} is missing {count} kept product(s), e.g. {sample:?}")]
    MissingProducts {
        dataset: &'static str,
        count: usize,
        sample: Vec<String>,
    },
}

impl VerifyError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateProductKey { .. } => ErrorCode::DuplicateProductKey,
            Self::UnexpectedProducts { .. } | Self::MissingProducts { .. } => {
                ErrorCode::IntegrityViolation
            }
        }
    }
}

/// Min, median and 95th percentile of a count column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub min: u32,
    pub median: u32,
    pub p95: u32,
}

impl Distribution {
    /// Summarize `values`, or `None` when there are none.
    #[must_use]
    pub fn of(mut values: Vec<u32>) -> Option<Self> {
        values.sort_unstable();
        Some(Self {
            min: *values.first()?,
            median: nearest_rank(&values, 50)?,
            p95: nearest_rank(&values, 95)?,
        })
    }
}

/// Summary of a verified curation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcReport {
    pub total_products: usize,
    pub kept_products: usize,
    /// Kept share of all products, 0–100. Zero when there are no products.
    pub kept_pct: f64,
    /// Always zero in a report; duplicates fail verification.
    pub duplicate_keys: usize,
    pub reviews_filtered_rows: usize,
    pub meta_filtered_rows: usize,
    /// Kept products without any metadata row.
    pub metadata_gaps: usize,
    pub metadata_gap_sample: Vec<String>,
    /// Metadata rows beyond the first for the same kept product.
    pub duplicate_metadata_rows: usize,
    /// Over kept products only.
    pub reviews_28d: Option<Distribution>,
    /// Over kept products only.
    pub future_reviews_28d: Option<Distribution>,
}

impl QcReport {
    /// Plain-text rendering, one fact per line.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Raw unique products:   {}", self.total_products);
        let _ = writeln!(out, "Kept products:         {}", self.kept_products);
        let _ = writeln!(out, "% kept:                {:.2}%", self.kept_pct);
        let _ = writeln!(out, "Duplicate product ids: {}", self.duplicate_keys);
        let _ = writeln!(out, "reviews_filtered rows: {}", self.reviews_filtered_rows);
        let _ = writeln!(out, "meta_filtered rows:    {}", self.meta_filtered_rows);
        let _ = writeln!(out, "Integrity:             filtered outputs match keep set");
        if self.metadata_gaps > 0 {
            let _ = writeln!(
                out,
                "Metadata gaps:         {} kept product(s) without metadata, e.g. {}",
                self.metadata_gaps,
                self.metadata_gap_sample.join(", ")
            );
        }
        if self.duplicate_metadata_rows > 0 {
            let _ = writeln!(
                out,
                "Duplicate meta rows:   {}",
                self.duplicate_metadata_rows
            );
        }
        for (name, dist) in [
            ("reviews_28d", self.reviews_28d),
            ("future_reviews_28d", self.future_reviews_28d),
        ] {
            match dist {
                Some(d) => {
                    let _ = writeln!(
                        out,
                        "{name:<22} min={} median={} p95={}",
                        d.min, d.median, d.p95
                    );
                }
                None => {
                    let _ = writeln!(out, "{name:<22} (no kept products)");
                }
            }
        }
        out
    }
}

/// Check that every product index row has a distinct `product_id`.
///
/// Returns the set of keys on success.
///
/// # Errors
///
/// Returns [`VerifyError::DuplicateProductKey`] listing a sample of the
/// repeated keys.
pub fn check_unique_keys<'a, I>(ids: I) -> Result<BTreeSet<&'a str>, VerifyError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = BTreeSet::new();
    let mut duplicated = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            duplicated.insert(id);
        }
    }
    if duplicated.is_empty() {
        Ok(seen)
    } else {
        Err(VerifyError::DuplicateProductKey {
            count: duplicated.len(),
            sample: sample(duplicated),
        })
    }
}

/// Check a filtered dataset's product set against the keep set.
///
/// Products outside `kept` are always an error. When `require_all` is set,
/// kept products absent from the dataset are an error too; otherwise they
/// are returned as coverage gaps.
///
/// # Errors
///
/// Returns [`VerifyError::UnexpectedProducts`] or
/// [`VerifyError::MissingProducts`].
pub fn check_coverage<'a>(
    dataset: &'static str,
    observed: &BTreeSet<&'a str>,
    kept: &BTreeSet<&'a str>,
    require_all: bool,
) -> Result<Vec<&'a str>, VerifyError> {
    let unexpected: Vec<&str> = observed.difference(kept).copied().collect();
    if !unexpected.is_empty() {
        return Err(VerifyError::UnexpectedProducts {
            dataset,
            count: unexpected.len(),
            sample: sample(unexpected),
        });
    }
    let missing: Vec<&str> = kept.difference(observed).copied().collect();
    if require_all && !missing.is_empty() {
        return Err(VerifyError::MissingProducts {
            dataset,
            count: missing.len(),
            sample: sample(missing),
        });
    }
    Ok(missing)
}

/// Verify a curated dataset and build its QC report.
///
/// `reviews_filtered` must cover the keep set exactly, since every kept
/// product has at least one event. `meta_filtered` may only name kept
/// products; kept products without metadata are reported, not rejected.
///
/// # Errors
///
/// Returns [`VerifyError`] on a duplicate product key or a join mismatch.
pub fn verify_curation(
    index: &[ProductIndexRow],
    reviews: &[ReviewRow],
    metadata: &[ProductMetadata],
) -> Result<QcReport, VerifyError> {
    let all = check_unique_keys(index.iter().map(|r| r.product_id.as_str()))?;
    let kept_rows: Vec<&ProductIndexRow> = index.iter().filter(|r| r.keep_product).collect();
    let kept: BTreeSet<&str> = kept_rows.iter().map(|r| r.product_id.as_str()).collect();

    let review_products: BTreeSet<&str> = reviews.iter().map(|r| r.product_id.as_str()).collect();
    check_coverage("reviews_filtered", &review_products, &kept, true)?;

    let mut meta_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in metadata {
        *meta_counts.entry(row.product_id()).or_default() += 1;
    }
    let meta_products: BTreeSet<&str> = meta_counts.keys().copied().collect();
    let gaps = check_coverage("meta_clean_filtered", &meta_products, &kept, false)?;
    let duplicate_metadata_rows = meta_counts.values().map(|n| n - 1).sum();

    if !gaps.is_empty() {
        warn!(
            count = gaps.len(),
            sample = ?&gaps[..gaps.len().min(SAMPLE_LIMIT)],
            "kept products without metadata"
        );
    }

    let report = QcReport {
        total_products: all.len(),
        kept_products: kept.len(),
        kept_pct: percentage(kept.len(), all.len()),
        duplicate_keys: 0,
        reviews_filtered_rows: reviews.len(),
        meta_filtered_rows: metadata.len(),
        metadata_gaps: gaps.len(),
        metadata_gap_sample: sample(gaps),
        duplicate_metadata_rows,
        reviews_28d: Distribution::of(kept_rows.iter().map(|r| r.reviews_28d).collect()),
        future_reviews_28d: Distribution::of(
            kept_rows.iter().map(|r| r.future_reviews_28d).collect(),
        ),
    };
    info!(
        total_products = report.total_products,
        kept_products = report.kept_products,
        kept_pct = report.kept_pct,
        metadata_gaps = report.metadata_gaps,
        "verification passed"
    );
    Ok(report)
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn sample<I, S>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .take(SAMPLE_LIMIT)
        .map(|k| k.as_ref().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::{Value, json};

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 6, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid")
    }

    fn index_row(id: &str, keep: bool, r28: u32, f28: u32) -> ProductIndexRow {
        ProductIndexRow {
            product_id: id.into(),
            launch_date: ts(),
            reviews_28d: r28,
            future_reviews_28d: f28,
            dataset_end: ts(),
            observable_55d: keep,
            eligible: keep,
            traction_flag: keep.then_some(f28 > 0),
            low_traction_flag: keep.then_some(f28 == 0),
            keep_product: keep,
            launch_year: 2022,
        }
    }

    fn review_row(id: &str) -> ReviewRow {
        ReviewRow {
            product_id: id.into(),
            item_id: format!("{id}-v"),
            rating: 4.0,
            text: String::new(),
            title: None,
            helpful_vote: 0,
            verified_purchase: false,
            timestamp: 1_654_041_600_000,
            review_date: ts(),
            launch_date: ts(),
            day_from_launch: 0,
            user_id: None,
        }
    }

    fn meta_row(id: &str) -> ProductMetadata {
        let Value::Object(fields) = json!({"parent_asin": id}) else {
            unreachable!()
        };
        ProductMetadata::from_object(fields).expect("keyed")
    }

    #[test]
    fn unique_keys_pass() {
        let keys = check_unique_keys(["a", "b", "c"]).expect("unique");
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn duplicate_keys_are_fatal() {
        let err = check_unique_keys(["a", "b", "a", "c", "b", "a"]).expect_err("dup");
        assert_eq!(err.code(), ErrorCode::DuplicateProductKey);
        assert_eq!(
            err,
            VerifyError::DuplicateProductKey {
                count: 2,
                sample: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn report_counts_and_distributions() {
        let index = vec![
            index_row("a", true, 3, 0),
            index_row("b", true, 5, 2),
            index_row("c", true, 9, 4),
            index_row("d", false, 1, 0),
        ];
        let reviews = vec![review_row("a"), review_row("b"), review_row("c")];
        let meta = vec![meta_row("a"), meta_row("b"), meta_row("c")];
        let report = verify_curation(&index, &reviews, &meta).expect("verify");

        assert_eq!(report.total_products, 4);
        assert_eq!(report.kept_products, 3);
        assert!((report.kept_pct - 75.0).abs() < f64::EPSILON);
        assert_eq!(
            report.reviews_28d,
            Some(Distribution { min: 3, median: 5, p95: 9 })
        );
        assert_eq!(
            report.future_reviews_28d,
            Some(Distribution { min: 0, median: 2, p95: 4 })
        );
        assert_eq!(report.metadata_gaps, 0);
    }

    #[test]
    fn review_for_unkept_product_is_an_integrity_violation() {
        let index = vec![index_row("a", true, 3, 0), index_row("d", false, 1, 0)];
        let reviews = vec![review_row("a"), review_row("d")];
        let err = verify_curation(&index, &reviews, &[]).expect_err("violation");
        assert_eq!(err.code(), ErrorCode::IntegrityViolation);
        assert!(matches!(
            err,
            VerifyError::UnexpectedProducts { dataset: "reviews_filtered", count: 1, .. }
        ));
    }

    #[test]
    fn kept_product_without_reviews_is_an_integrity_violation() {
        let index = vec![index_row("a", true, 3, 0), index_row("b", true, 3, 0)];
        let err = verify_curation(&index, &[review_row("a")], &[]).expect_err("missing");
        assert!(matches!(
            err,
            VerifyError::MissingProducts { dataset: "reviews_filtered", .. }
        ));
    }

    #[test]
    fn metadata_gaps_and_duplicates_are_reported_not_fatal() {
        let index = vec![index_row("a", true, 3, 0), index_row("b", true, 4, 1)];
        let reviews = vec![review_row("a"), review_row("b")];
        let meta = vec![meta_row("a"), meta_row("a")];
        let report = verify_curation(&index, &reviews, &meta).expect("verify");
        assert_eq!(report.metadata_gaps, 1);
        assert_eq!(report.metadata_gap_sample, vec!["b".to_string()]);
        assert_eq!(report.duplicate_metadata_rows, 1);
    }

    #[test]
    fn metadata_for_unkept_product_is_an_integrity_violation() {
        let index = vec![index_row("a", true, 3, 0), index_row("z", false, 0, 0)];
        let err = verify_curation(&index, &[review_row("a")], &[meta_row("z")])
            .expect_err("violation");
        assert!(matches!(
            err,
            VerifyError::UnexpectedProducts { dataset: "meta_clean_filtered", .. }
        ));
    }

    #[test]
    fn empty_index_reports_zero_percent() {
        let report = verify_curation(&[], &[], &[]).expect("verify");
        assert_eq!(report.total_products, 0);
        assert!(report.kept_pct.abs() < f64::EPSILON);
        assert!(report.reviews_28d.is_none());
        assert!(report.render_text().contains("% kept:                0.00%"));
    }

    #[test]
    fn text_report_mentions_gaps_only_when_present() {
        let index = vec![index_row("a", true, 3, 0)];
        let full = verify_curation(&index, &[review_row("a")], &[meta_row("a")]).expect("ok");
        assert!(!full.render_text().contains("Metadata gaps"));
        let gappy = verify_curation(&index, &[review_row("a")], &[]).expect("ok");
        assert!(gappy.render_text().contains("Metadata gaps"));
    }

    #[test]
    fn sample_is_capped() {
        let ids: Vec<String> = (0..20).map(|i| format!("k{i:02}")).collect();
        let doubled = ids.iter().chain(ids.iter()).map(String::as_str);
        let Err(VerifyError::DuplicateProductKey { count, sample }) = check_unique_keys(doubled)
        else {
            panic!("expected duplicates");
        };
        assert_eq!(count, 20);
        assert_eq!(sample.len(), SAMPLE_LIMIT);
    }
}
