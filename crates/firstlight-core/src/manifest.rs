//! Run manifest written alongside the curated artifacts.
//!
//! The manifest records what a run produced (row count, byte length and a
//! BLAKE3 content hash per artifact) together with the horizon, the fixed
//! window constants and the QC report. `fl verify` recomputes every field
//! from the directory contents and compares.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::cohort::ELIGIBILITY_MIN_REVIEWS;
use crate::horizon::Horizon;
use crate::sink::Artifact;
use crate::verify::QcReport;
use crate::window::{DayWindow, OUTCOME_WINDOW, SIGNAL_WINDOW};

/// Manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// `blake3:<lowercase hex>` hash of `bytes`.
#[must_use]
pub fn file_hash(bytes: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(bytes).to_hex())
}

/// Number of non-blank lines in a JSON Lines payload.
#[must_use]
pub fn count_rows(bytes: &[u8]) -> u64 {
    let rows = bytes
        .split(|&b| b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .count();
    u64::try_from(rows).unwrap_or(u64::MAX)
}

/// Summary of one written artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub artifact: Artifact,
    pub file_name: String,
    pub rows: u64,
    pub byte_len: u64,
    pub file_hash: String,
}

impl ArtifactEntry {
    /// Describe `bytes` as the contents of `artifact`.
    #[must_use]
    pub fn describe(artifact: Artifact, bytes: &[u8]) -> Self {
        Self {
            artifact,
            file_name: artifact.file_name().to_string(),
            rows: count_rows(bytes),
            byte_len: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            file_hash: file_hash(bytes),
        }
    }
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub generator: String,
    pub dataset_end: NaiveDateTime,
    pub cutoff_date: NaiveDate,
    pub signal_window: DayWindow,
    pub outcome_window: DayWindow,
    pub eligibility_min_reviews: u32,
    pub artifacts: Vec<ArtifactEntry>,
    pub qc: QcReport,
}

impl Manifest {
    /// Assemble a manifest for the current crate version and constants.
    #[must_use]
    pub fn new(horizon: &Horizon, artifacts: Vec<ArtifactEntry>, qc: QcReport) -> Self {
        Self {
            version: MANIFEST_VERSION,
            generator: format!("firstlight {}", env!("CARGO_PKG_VERSION")),
            dataset_end: horizon.dataset_end(),
            cutoff_date: horizon.cutoff_date(),
            signal_window: SIGNAL_WINDOW,
            outcome_window: OUTCOME_WINDOW,
            eligibility_min_reviews: ELIGIBILITY_MIN_REVIEWS,
            artifacts,
            qc,
        }
    }

    /// Entry recorded for `artifact`, if any.
    #[must_use]
    pub fn entry(&self, artifact: Artifact) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|e| e.artifact == artifact)
    }

    /// Pretty-printed JSON with a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; not expected for well-formed values.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
