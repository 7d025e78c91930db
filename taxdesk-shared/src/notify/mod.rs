/// Notification capability
///
/// Services receive a [`Notifier`] at construction and call it only after a
/// successful commit. Delivery is fire-and-forget: a failed send is logged by
/// the caller and never fails the request.
///
/// The mail transport itself lives outside this crate; [`TracingNotifier`]
/// writes every notification to the log as structured JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::task::TaskStatus;

/// Notification error types
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The notification could not be encoded
    #[error("Failed to encode notification: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The transport refused the message
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// What happened, with the data a template needs to render it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    AccountCreated {
        client_id: Uuid,
        admin_name: String,
    },
    TaskAssigned {
        task_id: Uuid,
        task_title: String,
        task_list_name: String,
        admin_name: String,
    },
    TaskUpdated {
        task_id: Uuid,
        task_title: String,
        admin_name: String,
    },
    AdminComment {
        task_id: Uuid,
        task_title: String,
        comment: String,
    },
    ClientComment {
        task_id: Uuid,
        task_title: String,
        client_name: String,
        comment: String,
    },
    StatusChanged {
        task_id: Uuid,
        task_title: String,
        status: TaskStatus,
        admin_name: String,
    },
    /// Periodic digest of tasks still waiting for the client
    Reminder {
        first_name: String,
        email: String,
        task_lists: Vec<PendingTaskList>,
    },
}

/// One task list in a reminder, with the titles still waiting, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTaskList {
    pub name: String,
    pub task_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub event: NotificationEvent,
}

impl Notification {
    pub fn new(recipient: impl Into<String>, subject: impl Into<String>, event: NotificationEvent) -> Self {
        Self {
            recipients: vec![recipient.into()],
            subject: subject.into(),
            event,
        }
    }
}

/// Sends notifications to their recipients
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&notification.event)?;

        info!(
            recipients = ?notification.recipients,
            subject = %notification.subject,
            payload = %payload,
            "Notification"
        );

        Ok(())
    }
}
