//! Re-verification of an existing output directory.
//!
//! Every artifact listed in `manifest.json` is re-hashed and re-counted,
//! then parsed back into row types and put through the same consistency
//! checks a fresh run performs. The recomputed QC report must equal the one
//! recorded in the manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{QcReport, VerifyError, verify_curation};
use crate::cohort::ProductIndexRow;
use crate::error::ErrorCode;
use crate::event::{ParsedLine, RecordError, parse_json_line, parse_lines, parse_metadata_line};
use crate::keep::ReviewRow;
use crate::manifest::{Manifest, count_rows, file_hash};
use crate::sink::Artifact;

/// Error raised while checking an output directory.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest does not list {}", .artifact.file_name())]
    Unlisted { artifact: Artifact },

    #[error("{}: hash mismatch (manifest {expected}, computed {computed})", .artifact.file_name())]
    HashMismatch {
        artifact: Artifact,
        expected: String,
        computed: String,
    },

    #[error("{}: row count mismatch (manifest {expected}, found {found})", .artifact.file_name())]
    RowMismatch {
        artifact: Artifact,
        expected: u64,
        found: u64,
    },

    #[error("{}:{line}: {kind}", .path.display())]
    Record {
        path: PathBuf,
        line: usize,
        kind: RecordError,
    },

    #[error("recomputed QC report differs from the manifest")]
    QcMismatch {
        recorded: Box<QcReport>,
        computed: Box<QcReport>,
    },

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl ArtifactError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::InputUnreadable,
            Self::Record { .. } => ErrorCode::MalformedRecord,
            Self::Manifest { .. }
            | Self::Unlisted { .. }
            | Self::HashMismatch { .. }
            | Self::RowMismatch { .. }
            | Self::QcMismatch { .. } => ErrorCode::ManifestMismatch,
            Self::Verify(e) => e.code(),
        }
    }
}

/// Result of a successful directory check.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryReport {
    pub dir: PathBuf,
    pub manifest: Manifest,
}

/// Check an output directory written by a curation run.
///
/// # Errors
///
/// Returns [`ArtifactError`] for the first failed check.
pub fn verify_output_dir(dir: &Path) -> Result<DirectoryReport, ArtifactError> {
    let manifest_path = dir.join(Artifact::Manifest.file_name());
    let manifest_bytes = read(&manifest_path)?;
    let manifest: Manifest =
        serde_json::from_slice(&manifest_bytes).map_err(|source| ArtifactError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;

    let (reviews_path, reviews) = read_checked(dir, &manifest, Artifact::ReviewsFiltered)?;
    let (index_path, index) = read_checked(dir, &manifest, Artifact::ProductIndex)?;
    let (meta_path, meta) = read_checked(dir, &manifest, Artifact::MetaCleanFiltered)?;

    let reviews: Vec<ReviewRow> = parse_rows(&reviews_path, &reviews, parse_json_line)?;
    let index: Vec<ProductIndexRow> = parse_rows(&index_path, &index, parse_json_line)?;
    let metadata = parse_rows(&meta_path, &meta, parse_metadata_line)?;

    let computed = verify_curation(&index, &reviews, &metadata)?;
    if computed != manifest.qc {
        return Err(ArtifactError::QcMismatch {
            recorded: Box::new(manifest.qc),
            computed: Box::new(computed),
        });
    }

    info!(
        dir = %dir.display(),
        products = computed.total_products,
        kept = computed.kept_products,
        "output directory verified"
    );
    Ok(DirectoryReport {
        dir: dir.to_path_buf(),
        manifest,
    })
}

/// Read one data artifact and check it against its manifest entry.
fn read_checked(
    dir: &Path,
    manifest: &Manifest,
    artifact: Artifact,
) -> Result<(PathBuf, Vec<u8>), ArtifactError> {
    let entry = manifest
        .entry(artifact)
        .ok_or(ArtifactError::Unlisted { artifact })?;
    let path = dir.join(artifact.file_name());
    let bytes = read(&path)?;

    let computed = file_hash(&bytes);
    if computed != entry.file_hash {
        return Err(ArtifactError::HashMismatch {
            artifact,
            expected: entry.file_hash.clone(),
            computed,
        });
    }
    let found = count_rows(&bytes);
    if found != entry.rows {
        return Err(ArtifactError::RowMismatch {
            artifact,
            expected: entry.rows,
            found,
        });
    }
    Ok((path, bytes))
}

fn read(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_rows<T>(
    path: &Path,
    bytes: &[u8],
    parse: impl Fn(&str) -> Result<ParsedLine<T>, RecordError>,
) -> Result<Vec<T>, ArtifactError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ArtifactError::Record {
        path: path.to_path_buf(),
        line: 0,
        kind: RecordError::InvalidJson(e.to_string()),
    })?;
    parse_lines(text, parse).map_err(|(line, kind)| ArtifactError::Record {
        path: path.to_path_buf(),
        line,
        kind,
    })
}
