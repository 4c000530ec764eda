//! End-to-end curation run.
//!
//! `fl curate` loads both input collections, labels every product, filters
//! the datasets to the kept cohort, verifies the result and hands the
//! artifacts to an [`OutputSink`]. Every stage is a pure function of the
//! previous stage's output; the dataset horizon is resolved once, after
//! aggregation and before classification.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::anchor::{AnchorError, anchor_events};
use crate::cohort::{ProductCohort, ProductIndexRow, classify_all};
use crate::error::ErrorCode;
use crate::event::{LoadError, ProductMetadata, ReviewEvent, load_metadata, load_reviews};
use crate::horizon::{self, EmptyDatasetError, Horizon};
use crate::keep::{KeptProducts, ReviewRow, filter_metadata, filter_reviews};
use crate::manifest::{ArtifactEntry, Manifest};
use crate::sink::{Artifact, OutputSink, SinkError};
use crate::timing::StageTimer;
use crate::verify::{QcReport, VerifyError, verify_curation};
use crate::window::aggregate_partitioned;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Any failure of a curation run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Anchor(#[from] AnchorError),

    #[error(transparent)]
    Horizon(#[from] EmptyDatasetError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("failed to encode {}: {source}", .artifact.file_name())]
    Encode {
        artifact: Artifact,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Load(e) => e.code(),
            Self::Anchor(e) => e.code(),
            Self::Horizon(e) => e.code(),
            Self::Verify(e) => e.code(),
            Self::Sink(e) => e.code(),
            Self::Encode { .. } => ErrorCode::InternalUnexpected,
        }
    }
}

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Input collection locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPaths {
    pub reviews: PathBuf,
    pub meta: PathBuf,
}

/// Tunables that do not affect the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Worker threads for window aggregation.
    pub partitions: NonZeroUsize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            partitions: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Verified, in-memory result of labeling and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct Curation {
    pub horizon: Horizon,
    /// One cohort per product, ordered by `product_id`.
    pub cohorts: Vec<ProductCohort>,
    pub kept: KeptProducts,
    /// Ordered by `product_id`, input order within a product.
    pub reviews: Vec<ReviewRow>,
    /// Ordered by `product_id`, input order within a product.
    pub metadata: Vec<ProductMetadata>,
    pub qc: QcReport,
}

impl Curation {
    /// The `product_index` rows.
    #[must_use]
    pub fn index_rows(&self) -> Vec<ProductIndexRow> {
        self.cohorts.iter().map(ProductCohort::to_row).collect()
    }
}

/// Outcome of a full run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub events: usize,
    pub metadata_rows: usize,
    pub manifest: Manifest,
    pub elapsed: std::time::Duration,
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Label every product and filter both datasets to the kept cohort.
///
/// # Errors
///
/// Returns [`PipelineError`] for malformed timestamps, an empty event set,
/// or a failed consistency check.
pub fn curate(
    reviews: &[ReviewEvent],
    metadata: &[ProductMetadata],
    options: RunOptions,
    timer: &mut StageTimer,
) -> Result<Curation, PipelineError> {
    let anchored = timer.time("anchor", || anchor_events(reviews))?;
    let summary = timer.time("aggregate", || {
        aggregate_partitioned(&anchored, options.partitions)
    });
    let horizon = timer.time("horizon", || horizon::resolve(summary.latest_review))?;
    let cohorts = timer.time("classify", || classify_all(&summary.products, &horizon));

    let (kept, reviews, metadata) = timer.time("filter", || {
        let kept = KeptProducts::from_cohorts(&cohorts);
        let mut reviews = filter_reviews(&anchored, &kept);
        reviews.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        let mut metadata = filter_metadata(metadata, &kept);
        metadata.sort_by(|a, b| a.product_id().cmp(b.product_id()));
        (kept, reviews, metadata)
    });

    let qc = timer.time("verify", || {
        let index: Vec<ProductIndexRow> = cohorts.iter().map(ProductCohort::to_row).collect();
        verify_curation(&index, &reviews, &metadata)
    })?;

    Ok(Curation {
        horizon,
        cohorts,
        kept,
        reviews,
        metadata,
        qc,
    })
}

/// Encode every artifact, stage it in `sink`, and commit.
///
/// # Errors
///
/// Returns [`PipelineError`] if encoding or the sink fails. Nothing is
/// committed in that case.
pub fn write_outputs(
    curation: &Curation,
    sink: &mut dyn OutputSink,
    timer: &mut StageTimer,
) -> Result<Manifest, PipelineError> {
    timer.time("write", || -> Result<Manifest, PipelineError> {
        let payloads = [
            (
                Artifact::ReviewsFiltered,
                encode_jsonl(Artifact::ReviewsFiltered, &curation.reviews)?,
            ),
            (
                Artifact::ProductIndex,
                encode_jsonl(Artifact::ProductIndex, &curation.index_rows())?,
            ),
            (
                Artifact::MetaCleanFiltered,
                encode_jsonl(
                    Artifact::MetaCleanFiltered,
                    curation.metadata.iter().map(ProductMetadata::fields),
                )?,
            ),
        ];

        let mut entries = Vec::with_capacity(payloads.len());
        for (artifact, bytes) in payloads {
            entries.push(ArtifactEntry::describe(artifact, &bytes));
            sink.put(artifact, bytes)?;
        }

        let manifest = Manifest::new(&curation.horizon, entries, curation.qc.clone());
        let manifest_bytes = manifest
            .to_json_bytes()
            .map_err(|source| PipelineError::Encode {
                artifact: Artifact::Manifest,
                source,
            })?;
        sink.put(Artifact::Manifest, manifest_bytes)?;
        sink.commit()?;
        Ok(manifest)
    })
}

/// Load, curate and write in one call.
///
/// # Errors
///
/// Returns [`PipelineError`] from whichever stage fails first.
pub fn run(
    inputs: &InputPaths,
    sink: &mut dyn OutputSink,
    options: RunOptions,
    timer: &mut StageTimer,
) -> Result<RunReport, PipelineError> {
    let start = Instant::now();

    let (reviews, metadata) = timer.time("load", || {
        Ok::<_, PipelineError>((load_reviews(&inputs.reviews)?, load_metadata(&inputs.meta)?))
    })?;
    let curation = curate(&reviews, &metadata, options, timer)?;
    let manifest = write_outputs(&curation, sink, timer)?;

    let elapsed = start.elapsed();
    info!(
        events = reviews.len(),
        metadata_rows = metadata.len(),
        products = curation.qc.total_products,
        kept = curation.qc.kept_products,
        partitions = options.partitions.get(),
        elapsed_ms = elapsed.as_millis(),
        "curation complete"
    );

    Ok(RunReport {
        events: reviews.len(),
        metadata_rows: metadata.len(),
        manifest,
        elapsed,
    })
}

/// One compact JSON object per line, each terminated by `\n`.
fn encode_jsonl<I>(artifact: Artifact, rows: I) -> Result<Vec<u8>, PipelineError>
where
    I: IntoIterator,
    I::Item: Serialize,
{
    let mut out = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut out, &row)
            .map_err(|source| PipelineError::Encode { artifact, source })?;
        out.push(b'\n');
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde_json::{Value, json};

    const DAY_MS: i64 = 86_400_000;
    const BASE_MS: i64 = 1_609_459_200_000; // 2021-01-01

    fn review(product: &str, day: i64) -> ReviewEvent {
        ReviewEvent {
            product_id: product.into(),
            item_id: format!("{product}-v1"),
            rating: 4.0,
            text: "ok".into(),
            title: None,
            helpful_vote: 0,
            verified_purchase: true,
            timestamp: Some(BASE_MS + day * DAY_MS),
            user_id: None,
        }
    }

    fn meta(product: &str) -> ProductMetadata {
        let Value::Object(fields) = json!({"parent_asin": product, "images": ["x"]}) else {
            unreachable!()
        };
        ProductMetadata::from_object(fields).expect("keyed")
    }

    fn dataset() -> Vec<ReviewEvent> {
        let mut events = vec![
            review("b-kept", 0),
            review("b-kept", 1),
            review("b-kept", 2),
            review("b-kept", 30),
        ];
        events.extend([review("a-thin", 0), review("a-thin", 5)]);
        events.extend([review("c-late", 150), review("c-late", 151), review("c-late", 152)]);
        events.push(review("z-end", 200));
        events
    }

    fn options(n: usize) -> RunOptions {
        RunOptions {
            partitions: NonZeroUsize::new(n).expect("non-zero"),
        }
    }

    #[test]
    fn curate_labels_filters_and_verifies() {
        let metadata = vec![meta("b-kept"), meta("a-thin")];
        let curation =
            curate(&dataset(), &metadata, options(2), &mut StageTimer::new()).expect("curate");

        let ids: Vec<_> = curation.cohorts.iter().map(|c| c.product_id.as_str()).collect();
        assert_eq!(ids, ["a-thin", "b-kept", "c-late", "z-end"]);
        assert_eq!(curation.kept.iter().collect::<Vec<_>>(), ["b-kept"]);
        assert_eq!(curation.reviews.len(), 4);
        assert_eq!(curation.metadata.len(), 1);
        assert_eq!(curation.qc.total_products, 4);
        assert_eq!(curation.qc.kept_products, 1);
    }

    #[test]
    fn empty_reviews_fail_with_empty_event_set() {
        let err = curate(&[], &[], options(1), &mut StageTimer::new()).expect_err("empty");
        assert_eq!(err.code(), ErrorCode::EmptyEventSet);
    }

    #[test]
    fn null_timestamp_aborts_the_run() {
        let mut events = dataset();
        events[3].timestamp = None;
        let err = curate(&events, &[], options(1), &mut StageTimer::new()).expect_err("null");
        assert_eq!(err.code(), ErrorCode::MalformedTimestamp);
    }

    #[test]
    fn write_outputs_stages_all_artifacts_and_commits() {
        let mut timer = StageTimer::new();
        let curation = curate(&dataset(), &[meta("b-kept")], options(1), &mut timer).expect("curate");
        let mut sink = MemorySink::new();
        let manifest = write_outputs(&curation, &mut sink, &mut timer).expect("write");

        assert!(sink.is_committed());
        for artifact in Artifact::DATA {
            let bytes = sink.get(artifact).expect("artifact present");
            let entry = manifest.entry(artifact).expect("manifest entry");
            assert_eq!(entry.file_hash, crate::manifest::file_hash(bytes));
        }
        assert_eq!(manifest.entry(Artifact::ProductIndex).map(|e| e.rows), Some(4));
        assert_eq!(manifest.entry(Artifact::ReviewsFiltered).map(|e| e.rows), Some(4));

        let meta_line = sink.get(Artifact::MetaCleanFiltered).expect("meta");
        let row: Value = serde_json::from_slice(meta_line.trim_ascii_end()).expect("json");
        assert_eq!(row, json!({"parent_asin": "b-kept"}));

        let names: Vec<_> = timer.report().operations.into_iter().map(|op| op.name).collect();
        assert_eq!(
            names,
            ["anchor", "aggregate", "horizon", "classify", "filter", "verify", "write"]
        );
    }

    #[test]
    fn product_index_is_byte_identical_across_runs_and_partitions() {
        let render = |n: usize, events: &[ReviewEvent]| {
            let curation = curate(events, &[], options(n), &mut StageTimer::new()).expect("curate");
            let mut sink = MemorySink::new();
            write_outputs(&curation, &mut sink, &mut StageTimer::new()).expect("write");
            sink.get(Artifact::ProductIndex).expect("index").to_vec()
        };
        let events = dataset();
        let mut reversed = dataset();
        reversed.reverse();

        let first = render(1, &events);
        assert_eq!(render(1, &events), first);
        assert_eq!(render(4, &events), first);
        assert_eq!(render(3, &reversed), first);
    }
}
