/// Flows that build the entity graph
///
/// [`board::TaskBoard`] registers clients, creates and edits tasks, records
/// comments and changes task status. [`reminder::ClientReminder`] sends the
/// periodic digest of tasks waiting for each client, one transaction per
/// client. Every other flow runs in one store transaction. Notifications go
/// out only after a commit. Deleting is the job of
/// [`crate::cascade::CascadeManager`].
///
/// # Uploads
///
/// Files reach a flow already written to disk by the upload layer, described
/// by an [`Upload`]. When a flow fails those files are unlinked again because
/// no committed record points at them.

use serde::Deserialize;
use std::path::PathBuf;
use uuid::Uuid;
use validator::Validate;

use crate::models::client::ClientRole;

pub mod board;
pub mod reminder;

pub use board::{TaskBoard, TaskCreated};
pub use reminder::{ClientReminder, ReminderReport, REMINDER_COMMENT};

/// Board error types
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// Input failed validation
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    /// The flow was rolled back
    #[error("{0}")]
    Conflict(String),
}

/// Account to register
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewClient {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Hash produced by the authentication layer
    #[validate(length(min = 1, message = "Password hash is required"))]
    pub password_hash: String,

    #[validate(length(max = 100, message = "First name must be at most 100 characters"))]
    #[serde(default)]
    pub first_name: String,

    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    #[serde(default)]
    pub last_name: String,

    #[validate(length(max = 200, message = "Business name must be at most 200 characters"))]
    #[serde(default)]
    pub business_name: String,

    #[serde(default)]
    pub role: ClientRole,
}

/// Task to create (or update) in a client's task list
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTask {
    pub client_id: Uuid,

    #[validate(length(min = 1, max = 100, message = "Task list name must be 1-100 characters"))]
    pub task_list_name: String,

    #[validate(length(min = 1, max = 200, message = "Task title must be 1-200 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewComment {
    pub task_id: Uuid,

    #[validate(length(min = 1, max = 5000, message = "Comment must be 1-5000 characters"))]
    pub body: String,
}

/// New title and description for an existing task
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EditTask {
    #[validate(length(min = 1, max = 200, message = "Task title must be 1-200 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RenameTaskList {
    #[validate(length(min = 1, max = 100, message = "Task list name must be 1-100 characters"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EditComment {
    #[validate(length(min = 1, max = 5000, message = "Comment must be 1-5000 characters"))]
    pub body: String,
}

/// File already stored on disk by the upload layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub original_name: String,
    pub path: PathBuf,
    pub size_bytes: i64,
    pub content_type: String,
}

impl Upload {
    pub fn new(
        original_name: impl Into<String>,
        path: impl Into<PathBuf>,
        size_bytes: i64,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            path: path.into(),
            size_bytes,
            content_type: content_type.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_validation() {
        let valid = NewClient {
            email: "max@example.com".to_string(),
            password_hash: "hash".to_string(),
            first_name: "Max".to_string(),
            last_name: String::new(),
            business_name: String::new(),
            role: ClientRole::Client,
        };
        assert!(valid.validate().is_ok());

        let invalid = NewClient {
            email: "not-an-email".to_string(),
            ..valid
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_edit_inputs_reject_empty_text() {
        let task = EditTask {
            title: String::new(),
            description: "Second page missing".to_string(),
        };
        assert!(task.validate().is_err());
        assert!(RenameTaskList { name: String::new() }.validate().is_err());
        assert!(EditComment { body: "Fixed".to_string() }.validate().is_ok());
    }

    #[test]
    fn test_new_task_requires_title() {
        let task = NewTask {
            client_id: Uuid::new_v4(),
            task_list_name: "Taxes 2024".to_string(),
            title: String::new(),
            description: String::new(),
        };
        assert!(task.validate().is_err());
    }
}
