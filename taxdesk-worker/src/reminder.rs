/// Periodic client reminder job
///
/// Waits one interval after start, then mails every client the tasks still
/// waiting on them and repeats until shutdown.
///
/// ```text
/// ReminderJob::run
///   ├─> wait interval (or shutdown)
///   ├─> ClientReminder::send_reminders
///   └─> repeat
/// ```

use serde::{Deserialize, Serialize};
use taxdesk_shared::services::{ClientReminder, ReminderReport};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Reminder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Days between reminder runs
    pub interval_days: u64,
}

impl ReminderConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_days.saturating_mul(SECS_PER_DAY))
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        ReminderConfig { interval_days: 3 }
    }
}

pub struct ReminderJob {
    reminder: ClientReminder,
    interval: Duration,
    shutdown_token: CancellationToken,
}

impl ReminderJob {
    pub fn new(reminder: ClientReminder, config: &ReminderConfig) -> Self {
        Self::with_interval(reminder, config.interval())
    }

    /// Job with an explicit pause between runs
    pub fn with_interval(reminder: ClientReminder, interval: Duration) -> Self {
        ReminderJob {
            reminder,
            interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token that stops [`ReminderJob::run`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs one reminder pass; errors are logged, not returned
    pub async fn run_once(&self) -> Option<ReminderReport> {
        match self.reminder.send_reminders().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Reminder run failed");
                None
            }
        }
    }

    /// Sends reminders every interval until the shutdown token is cancelled
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Reminder job starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = sleep(self.interval) => {}
            }

            self.run_once().await;
        }

        tracing::info!("Reminder job stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_in_days() {
        let config = ReminderConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(3 * 86_400));
    }
}
