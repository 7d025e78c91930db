/// Orphaned-file sweeper
///
/// Deletes that commit but cannot unlink a file leave the path in the orphan
/// queue. The sweeper retries the queue on a fixed interval until shutdown.
///
/// ```text
/// OrphanSweeper::run
///   ├─> PostCommitCleanup::sweep(batch)
///   ├─> wait interval (or shutdown)
///   └─> repeat
/// ```
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use taxdesk_shared::files::{DiskRemover, PostCommitCleanup};
/// use taxdesk_shared::store::{DocumentStore, MemoryStore};
/// use taxdesk_worker::sweeper::{OrphanSweeper, SweeperConfig};
///
/// # async fn example() {
/// let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
/// let sweeper = OrphanSweeper::new(
///     PostCommitCleanup::new(store, Arc::new(DiskRemover)),
///     SweeperConfig::default(),
/// );
///
/// let token = sweeper.shutdown_token();
/// let handle = tokio::spawn(async move { sweeper.run().await });
/// token.cancel();
/// handle.await.unwrap();
/// # }
/// ```

use serde::{Deserialize, Serialize};
use taxdesk_shared::files::{PostCommitCleanup, SweepReport};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// Sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Pause between sweeps in seconds
    pub interval_secs: u64,

    /// Orphans retried per sweep
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        SweeperConfig {
            interval_secs: 300,
            batch_size: 100,
        }
    }
}

/// Periodically retries queued orphaned files
pub struct OrphanSweeper {
    cleanup: PostCommitCleanup,
    config: SweeperConfig,
    shutdown_token: CancellationToken,
}

impl OrphanSweeper {
    pub fn new(cleanup: PostCommitCleanup, config: SweeperConfig) -> Self {
        OrphanSweeper {
            cleanup,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token that stops [`OrphanSweeper::run`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs one sweep; errors are logged, not returned
    pub async fn run_once(&self) -> Option<SweepReport> {
        match self.cleanup.sweep(self.config.batch_size).await {
            Ok(report) => {
                tracing::debug!(
                    resolved = report.resolved,
                    failed = report.failed,
                    "Sweep complete"
                );
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Orphan sweep failed");
                None
            }
        }
    }

    /// Sweeps until the shutdown token is cancelled
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            batch_size = self.config.batch_size,
            "Orphan sweeper starting"
        );

        let interval = Duration::from_secs(self.config.interval_secs);

        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            self.run_once().await;

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = sleep(interval) => {}
            }
        }

        tracing::info!("Orphan sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweeper_config_default() {
        let config = SweeperConfig::default();
        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.batch_size, 100);
    }
}
