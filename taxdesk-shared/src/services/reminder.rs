/// Periodic client reminders
///
/// Every run walks all accounts. For each client with tasks still
/// `waiting for client`, a system comment is appended to those tasks and the
/// client receives one digest grouped by task list.
///
/// ```text
/// list clients ─> per client: begin ─> collect waiting ─> comment each ─> commit ─> notify
/// ```

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::{
    client::Client,
    comment::Comment,
    task::{Task, TaskStatus},
};
use crate::notify::{Notification, NotificationEvent, Notifier, PendingTaskList};
use crate::store::{DocumentStore, StoreResult, StoreTransaction};

/// System comment appended to every task named in a reminder
pub const REMINDER_COMMENT: &str = "Automatically reminder email sent to client - success";

const REMINDER_SUBJECT: &str = "Automatically reminder";

/// Outcome of one reminder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderReport {
    /// Clients that were sent a digest
    pub reminded: usize,

    /// Tasks listed across all digests
    pub tasks: usize,

    /// Clients whose transaction failed
    pub failed: usize,
}

#[derive(Clone)]
pub struct ClientReminder {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
}

impl ClientReminder {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Reminds every client with waiting tasks
    ///
    /// Each client is handled in its own transaction, so one failure does
    /// not hold back the others.
    ///
    /// # Errors
    ///
    /// Only when the client list cannot be read.
    pub async fn send_reminders(&self) -> StoreResult<ReminderReport> {
        let mut tx = self.store.begin().await?;
        let clients = tx.list_clients().await;
        if let Err(e) = tx.rollback().await {
            warn!(error = %e, "Rollback of read transaction failed");
        }
        let clients = clients?;

        let mut report = ReminderReport::default();
        for client in clients.iter().filter(|c| !c.task_list_ids.is_empty()) {
            match self.remind(client).await {
                Ok(0) => {}
                Ok(tasks) => {
                    report.reminded += 1;
                    report.tasks += tasks;
                }
                Err(e) => {
                    error!(client_id = %client.id, error = %e, "Failed to remind client");
                    report.failed += 1;
                }
            }
        }

        info!(
            reminded = report.reminded,
            tasks = report.tasks,
            failed = report.failed,
            "Reminder run complete"
        );

        Ok(report)
    }

    /// Returns how many tasks were listed for the client
    async fn remind(&self, client: &Client) -> StoreResult<usize> {
        let mut tx = self.store.begin().await?;

        let pending = match mark_waiting_tasks(tx.as_mut(), client).await {
            Ok(pending) => pending,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "Rollback failed");
                }
                return Err(e);
            }
        };

        if pending.is_empty() {
            tx.rollback().await?;
            return Ok(0);
        }
        tx.commit().await?;

        let tasks = pending.iter().map(|list| list.task_titles.len()).sum();
        let notification = Notification::new(
            &client.email,
            REMINDER_SUBJECT,
            NotificationEvent::Reminder {
                first_name: client.first_name.clone(),
                email: client.email.clone(),
                task_lists: pending,
            },
        );
        if let Err(e) = self.notifier.send(notification).await {
            warn!(client_id = %client.id, error = %e, "Failed to send reminder");
        }

        Ok(tasks)
    }
}

/// Comments every waiting task of the client and returns them grouped by list
async fn mark_waiting_tasks(
    tx: &mut dyn StoreTransaction,
    client: &Client,
) -> StoreResult<Vec<PendingTaskList>> {
    let mut pending = Vec::new();

    for list_id in &client.task_list_ids {
        let Some(list) = tx.find_task_list(*list_id).await? else {
            warn!(client_id = %client.id, task_list_id = %list_id, "Skipping missing task list");
            continue;
        };

        let mut waiting: Vec<Task> = Vec::new();
        for task_id in &list.task_ids {
            match tx.find_task(*task_id).await? {
                Some(task) if task.status == TaskStatus::WaitingForClient => waiting.push(task),
                Some(_) => {}
                None => warn!(task_id = %task_id, "Skipping missing task"),
            }
        }
        if waiting.is_empty() {
            continue;
        }
        waiting.sort_by_key(|task| task.created_at);

        for task in &waiting {
            tx.push_comment(&Comment::system(task.id, client.id, REMINDER_COMMENT))
                .await?;
        }
        debug!(task_list_id = %list.id, tasks = waiting.len(), "Marked waiting tasks");

        pending.push(PendingTaskList {
            name: list.name,
            task_titles: waiting.into_iter().map(|task| task.title).collect(),
        });
    }

    Ok(pending)
}
