//! Output sinks.
//!
//! The pipeline never touches the filesystem directly; it hands finished
//! artifacts to an [`OutputSink`]. [`DirSink`] stages every artifact in a
//! sibling directory and renames it into place on [`OutputSink::commit`], so
//! a failed run leaves no output directory behind. [`MemorySink`] keeps the
//! bytes in memory for tests and embedding.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ErrorCode;

/// Files making up one curated output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    ReviewsFiltered,
    ProductIndex,
    MetaCleanFiltered,
    Manifest,
}

impl Artifact {
    /// Data artifacts, in the order they are written and listed in the
    /// manifest.
    pub const DATA: [Self; 3] = [
        Self::ReviewsFiltered,
        Self::ProductIndex,
        Self::MetaCleanFiltered,
    ];

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::ReviewsFiltered => "reviews_filtered.jsonl",
            Self::ProductIndex => "product_index.jsonl",
            Self::MetaCleanFiltered => "meta_clean_filtered.jsonl",
            Self::Manifest => "manifest.json",
        }
    }
}

/// Sink error.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("output directory already exists: {} (pass --force to replace it)", .path.display())]
    Exists { path: PathBuf },

    #[error("output path has no directory name: {}", .path.display())]
    InvalidTarget { path: PathBuf },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sink already committed")]
    AlreadyCommitted,
}

impl SinkError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Exists { .. } => ErrorCode::OutputExists,
            Self::InvalidTarget { .. } | Self::Io { .. } => ErrorCode::OutputWriteFailed,
            Self::AlreadyCommitted => ErrorCode::InternalUnexpected,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Destination for the artifacts of one run.
///
/// Artifacts put before `commit` must not become visible to readers until
/// `commit` succeeds. A sink is committed at most once.
pub trait OutputSink {
    /// Store one artifact. Putting the same artifact twice replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the artifact cannot be stored.
    fn put(&mut self, artifact: Artifact, bytes: Vec<u8>) -> Result<(), SinkError>;

    /// Publish every stored artifact at once.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if publication fails; nothing is published in
    /// that case.
    fn commit(&mut self) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// DirSink
// ---------------------------------------------------------------------------

/// Writes artifacts into a directory via a sibling staging directory.
#[derive(Debug)]
pub struct DirSink {
    target: PathBuf,
    staging: PathBuf,
    /// Ancestors created for the staging directory, deepest first.
    created_parents: Vec<PathBuf>,
    committed: bool,
}

impl DirSink {
    /// Prepare a sink publishing into `target`.
    ///
    /// An existing `target` is refused unless `force` is set, in which case
    /// it is replaced on commit.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Exists`] for an existing target without `force`,
    /// or [`SinkError::Io`] if the staging directory cannot be created.
    pub fn create(target: impl Into<PathBuf>, force: bool) -> Result<Self, SinkError> {
        let target = target.into();
        if target.exists() && !force {
            return Err(SinkError::Exists { path: target });
        }
        let staging = sibling(&target, "staging")?;
        let created_parents = match staging.parent() {
            Some(parent) => create_parents(parent)?,
            None => Vec::new(),
        };
        // From here on a failure drops the sink, which undoes the above.
        let sink = Self {
            target,
            staging,
            created_parents,
            committed: false,
        };
        if sink.staging.exists() {
            debug!(path = %sink.staging.display(), "removing stale staging directory");
            fs::remove_dir_all(&sink.staging).map_err(|e| SinkError::io(&sink.staging, e))?;
        }
        fs::create_dir(&sink.staging).map_err(|e| SinkError::io(&sink.staging, e))?;
        Ok(sink)
    }

    /// Directory artifacts are written to before commit.
    #[must_use]
    pub fn staging(&self) -> &Path {
        &self.staging
    }
}

impl OutputSink for DirSink {
    fn put(&mut self, artifact: Artifact, bytes: Vec<u8>) -> Result<(), SinkError> {
        if self.committed {
            return Err(SinkError::AlreadyCommitted);
        }
        let path = self.staging.join(artifact.file_name());
        fs::write(&path, &bytes).map_err(|e| SinkError::io(&path, e))?;
        debug!(artifact = artifact.file_name(), bytes = bytes.len(), "artifact staged");
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        if self.committed {
            return Err(SinkError::AlreadyCommitted);
        }
        let backup = if self.target.exists() {
            let backup = sibling(&self.target, "previous")?;
            if backup.exists() {
                fs::remove_dir_all(&backup).map_err(|e| SinkError::io(&backup, e))?;
            }
            fs::rename(&self.target, &backup).map_err(|e| SinkError::io(&self.target, e))?;
            Some(backup)
        } else {
            None
        };

        if let Err(e) = fs::rename(&self.staging, &self.target) {
            if let Some(backup) = &backup
                && let Err(restore) = fs::rename(backup, &self.target)
            {
                warn!(
                    path = %backup.display(),
                    error = %restore,
                    "failed to restore previous output directory"
                );
            }
            return Err(SinkError::io(&self.target, e));
        }
        self.committed = true;

        if let Some(backup) = backup
            && let Err(e) = fs::remove_dir_all(&backup)
        {
            warn!(path = %backup.display(), error = %e, "failed to remove replaced output");
        }
        info!(path = %self.target.display(), "output committed");
        Ok(())
    }
}

impl Drop for DirSink {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if self.staging.exists() {
            let _ = fs::remove_dir_all(&self.staging);
        }
        for dir in &self.created_parents {
            // Only empty directories go; anything else now lives there.
            if fs::remove_dir(dir).is_err() {
                break;
            }
        }
    }
}

/// Create `dir` and any missing ancestors, returning the ones that did not
/// exist before, deepest first.
fn create_parents(dir: &Path) -> Result<Vec<PathBuf>, SinkError> {
    let missing: Vec<PathBuf> = dir
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect();
    if let Err(e) = fs::create_dir_all(dir) {
        for created in missing.iter().filter(|p| p.is_dir()) {
            let _ = fs::remove_dir(created);
        }
        return Err(SinkError::io(dir, e));
    }
    if !missing.is_empty() {
        debug!(path = %dir.display(), created = missing.len(), "created output parent");
    }
    Ok(missing)
}

/// `<parent>/.<name>.<tag>-<pid>` next to `target`.
fn sibling(target: &Path, tag: &str) -> Result<PathBuf, SinkError> {
    let name = target
        .file_name()
        .ok_or_else(|| SinkError::InvalidTarget {
            path: target.to_path_buf(),
        })?
        .to_string_lossy();
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!(".{name}.{tag}-{}", std::process::id())))
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Keeps artifacts in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: BTreeMap<Artifact, Vec<u8>>,
    committed: bool,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of a stored artifact.
    #[must_use]
    pub fn get(&self, artifact: Artifact) -> Option<&[u8]> {
        self.artifacts.get(&artifact).map(Vec::as_slice)
    }

    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }
}

impl OutputSink for MemorySink {
    fn put(&mut self, artifact: Artifact, bytes: Vec<u8>) -> Result<(), SinkError> {
        if self.committed {
            return Err(SinkError::AlreadyCommitted);
        }
        self.artifacts.insert(artifact, bytes);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        if self.committed {
            return Err(SinkError::AlreadyCommitted);
        }
        self.committed = true;
        Ok(())
    }
}
