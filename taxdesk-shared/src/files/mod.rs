/// Post-commit disk cleanup
///
/// Uploaded bytes live on the filesystem, outside the store's transaction, so
/// they can only be removed once the records pointing at them are committed
/// as deleted. [`PostCommitCleanup`] is that second phase: it is best-effort,
/// never fails the request that triggered it, and hands every path it could
/// not remove to the store's orphaned-file queue for [`PostCommitCleanup::sweep`]
/// to retry later.
///
/// ```text
/// commit ──> unlink_all(paths)
///              ├─> removed / already absent   -> unlinked
///              └─> any other io error          -> error! + orphan queue
///
/// worker ──> sweep(batch)
///              ├─> removed / already absent   -> resolve_orphan
///              └─> still failing               -> note_orphan_failure
/// ```

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::store::{DocumentStore, StoreError};

/// Removes one stored file
#[async_trait]
pub trait FileRemover: Send + Sync {
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

/// [`FileRemover`] backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskRemover;

#[async_trait]
impl FileRemover for DiskRemover {
    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// Cleanup error types
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    /// The orphan queue could not be read or updated
    #[error("Orphan queue error: {0}")]
    Store(#[from] StoreError),
}

/// Paths handled by one [`PostCommitCleanup::unlink_all`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlinkReport {
    /// Removed, or already absent
    pub unlinked: Vec<PathBuf>,

    /// Could not be removed; queued for the sweeper
    pub orphaned: Vec<PathBuf>,
}

/// Result of one sweep over the orphan queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub resolved: usize,
    pub failed: usize,
}

/// Second phase of every delete: remove files after commit
#[derive(Clone)]
pub struct PostCommitCleanup {
    store: Arc<dyn DocumentStore>,
    remover: Arc<dyn FileRemover>,
}

impl PostCommitCleanup {
    pub fn new(store: Arc<dyn DocumentStore>, remover: Arc<dyn FileRemover>) -> Self {
        Self { store, remover }
    }

    /// Removes every path; must only be called after the owning transaction
    /// committed
    pub async fn unlink_all(&self, paths: Vec<PathBuf>) -> UnlinkReport {
        let mut report = UnlinkReport::default();
        let mut failures = Vec::new();

        for path in paths {
            match self.remover.remove(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed file");
                    report.unlinked.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "File already absent");
                    report.unlinked.push(path);
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to remove file after commit");
                    failures.push((path.to_string_lossy().into_owned(), e.to_string()));
                    report.orphaned.push(path);
                }
            }
        }

        if !failures.is_empty() {
            if let Err(e) = self.store.record_orphans(&failures).await {
                error!(
                    count = failures.len(),
                    error = %e,
                    "Failed to queue orphaned files; they need manual removal"
                );
            }
        }

        report
    }

    /// Retries up to `batch` queued orphans
    pub async fn sweep(&self, batch: usize) -> Result<SweepReport, CleanupError> {
        let pending = self.store.pending_orphans(batch).await?;
        let mut report = SweepReport::default();

        for orphan in pending {
            match self.remover.remove(Path::new(&orphan.path)).await {
                Ok(()) => {
                    self.store.resolve_orphan(orphan.id).await?;
                    report.resolved += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.store.resolve_orphan(orphan.id).await?;
                    report.resolved += 1;
                }
                Err(e) => {
                    warn!(
                        orphan_id = %orphan.id,
                        path = %orphan.path,
                        attempts = orphan.attempts + 1,
                        error = %e,
                        "Orphaned file still cannot be removed"
                    );
                    self.store
                        .note_orphan_failure(orphan.id, &e.to_string())
                        .await?;
                    report.failed += 1;
                }
            }
        }

        if report.resolved > 0 || report.failed > 0 {
            info!(
                resolved = report.resolved,
                failed = report.failed,
                "Orphan sweep finished"
            );
        }

        Ok(report)
    }
}
