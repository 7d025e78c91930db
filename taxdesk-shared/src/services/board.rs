/// Task board flows
///
/// ```text
/// validate ─> begin ─> reads + writes ─> commit ─> notify
///                 │                          │
///                 └──────── failure ─────────┴─> rollback + discard uploads
/// ```

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::{BoardError, EditComment, EditTask, NewClient, NewComment, NewTask, RenameTaskList, Upload};
use crate::files::PostCommitCleanup;
use crate::models::{
    activity::Activity,
    client::{Client, ClientRole},
    comment::Comment,
    file::FileRecord,
    task::{Task, TaskStatus},
    task_list::TaskList,
};
use crate::notify::{Notification, NotificationEvent, Notifier};
use crate::store::{DocumentStore, StoreError, StoreTransaction};

/// Name used when a flow is triggered without an admin name
const DEFAULT_STAFF_NAME: &str = "TaxDesk staff";

/// Why a flow stopped inside its transaction
#[derive(Debug, thiserror::Error)]
enum FlowError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Rejected(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of [`TaskBoard::create_task`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCreated {
    pub message: String,
    pub task_list_id: Uuid,
    pub task_id: Uuid,

    /// Records created for the uploads
    pub file_ids: Vec<Uuid>,
}

/// Creation and update flows over one document store
#[derive(Clone)]
pub struct TaskBoard {
    store: Arc<dyn DocumentStore>,
    cleanup: PostCommitCleanup,
    notifier: Arc<dyn Notifier>,

    /// Address that receives client comments
    staff_inbox: String,
}

impl TaskBoard {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cleanup: PostCommitCleanup,
        notifier: Arc<dyn Notifier>,
        staff_inbox: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cleanup,
            notifier,
            staff_inbox: staff_inbox.into(),
        }
    }

    /// Registers a new account
    ///
    /// # Errors
    ///
    /// - `Validation` on malformed input
    /// - `Conflict` when the email is taken or the store fails
    pub async fn register_client(
        &self,
        input: NewClient,
        admin_name: &str,
    ) -> Result<Client, BoardError> {
        input.validate()?;

        let mut client = Client::new(&input.email, &input.password_hash, input.role);
        client.first_name = input.first_name;
        client.last_name = input.last_name;
        client.business_name = input.business_name;

        let mut tx = self.begin("Error when registering client").await?;
        let result = register_in(tx.as_mut(), &client).await;
        self.finish(tx, result, &[], "Error when registering client")
            .await?;

        info!(client_id = %client.id, role = client.role.as_str(), "Registered client");

        self.notify(Notification::new(
            &client.email,
            "Your new account in TaxDesk",
            NotificationEvent::AccountCreated {
                client_id: client.id,
                admin_name: staff_name(admin_name).to_string(),
            },
        ))
        .await;

        Ok(client)
    }

    /// Creates a task, creating its task list on first use
    ///
    /// When the list already holds a task with the same title, that task's
    /// description is replaced and the uploads are appended to it instead.
    pub async fn create_task(
        &self,
        input: NewTask,
        uploads: Vec<Upload>,
        admin_name: &str,
    ) -> Result<TaskCreated, BoardError> {
        const CONFLICT: &str = "Error when creating new task";

        if let Err(e) = input.validate() {
            self.discard(&uploads).await;
            return Err(e.into());
        }

        let mut tx = self.begin_or_discard(CONFLICT, &uploads).await?;
        let result = create_task_in(tx.as_mut(), &input, &uploads, admin_name).await;
        let (created, notification) = self.finish(tx, result, &uploads, CONFLICT).await?;

        info!(
            task_id = %created.task_id,
            task_list_id = %created.task_list_id,
            files = created.file_ids.len(),
            "{}",
            created.message
        );

        self.notify(notification).await;
        Ok(created)
    }

    /// Adds a comment to a task
    ///
    /// Admin comments notify the client. Client comments move the task to
    /// `needs review`, record an activity row and notify the staff inbox.
    pub async fn leave_comment(
        &self,
        author_id: Uuid,
        input: NewComment,
        uploads: Vec<Upload>,
    ) -> Result<Comment, BoardError> {
        const CONFLICT: &str = "Error when leaving new comment";

        if let Err(e) = input.validate() {
            self.discard(&uploads).await;
            return Err(e.into());
        }

        let mut tx = self.begin_or_discard(CONFLICT, &uploads).await?;
        let result = leave_comment_in(tx.as_mut(), author_id, &input, &uploads, &self.staff_inbox).await;
        let (comment, notification) = self.finish(tx, result, &uploads, CONFLICT).await?;

        info!(
            task_id = %comment.task_id,
            comment_id = %comment.id,
            author_id = %comment.author_id,
            files = comment.file_ids.len(),
            "Comment added"
        );

        self.notify(notification).await;
        Ok(comment)
    }

    /// Changes a task's status and records it as a system comment
    pub async fn change_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        admin_name: &str,
    ) -> Result<Task, BoardError> {
        const CONFLICT: &str = "Error when changing task status";

        let mut tx = self.begin(CONFLICT).await?;
        let result = change_status_in(tx.as_mut(), task_id, status, admin_name).await;
        let (task, notification) = self.finish(tx, result, &[], CONFLICT).await?;

        info!(task_id = %task.id, status = %task.status, "Task status changed");

        self.notify(notification).await;
        Ok(task)
    }

    /// Switches an account between `admin` and `client`
    pub async fn change_client_role(
        &self,
        client_id: Uuid,
        role: ClientRole,
    ) -> Result<Client, BoardError> {
        const CONFLICT: &str = "Error when changing the client role";

        let mut tx = self.begin(CONFLICT).await?;
        let result = change_role_in(tx.as_mut(), client_id, role).await;
        let client = self.finish(tx, result, &[], CONFLICT).await?;

        info!(client_id = %client.id, role = client.role.as_str(), "Client role changed");
        Ok(client)
    }

    /// Renames a task list; names stay unique per owner
    pub async fn rename_task_list(
        &self,
        task_list_id: Uuid,
        input: RenameTaskList,
    ) -> Result<TaskList, BoardError> {
        const CONFLICT: &str = "Error when edit task list name";

        input.validate()?;

        let mut tx = self.begin(CONFLICT).await?;
        let result = rename_in(tx.as_mut(), task_list_id, &input.name).await;
        let list = self.finish(tx, result, &[], CONFLICT).await?;

        info!(task_list_id = %list.id, "Task list renamed");
        Ok(list)
    }

    /// Replaces a task's title and description
    pub async fn edit_task(&self, task_id: Uuid, input: EditTask) -> Result<Task, BoardError> {
        const CONFLICT: &str = "Error when edit task title & description";

        input.validate()?;

        let mut tx = self.begin(CONFLICT).await?;
        let result = edit_task_in(tx.as_mut(), task_id, &input).await;
        let task = self.finish(tx, result, &[], CONFLICT).await?;

        info!(task_id = %task.id, "Task edited");
        Ok(task)
    }

    /// Replaces the body of a comment; attachments are kept
    pub async fn edit_comment(
        &self,
        task_id: Uuid,
        comment_id: Uuid,
        input: EditComment,
    ) -> Result<Comment, BoardError> {
        const CONFLICT: &str = "Error when editing task comment";

        input.validate()?;

        let mut tx = self.begin(CONFLICT).await?;
        let result = edit_comment_in(tx.as_mut(), task_id, comment_id, &input.body).await;
        let comment = self.finish(tx, result, &[], CONFLICT).await?;

        info!(task_id = %task_id, comment_id = %comment.id, "Comment edited");
        Ok(comment)
    }

    async fn begin(&self, conflict: &'static str) -> Result<Box<dyn StoreTransaction>, BoardError> {
        self.store.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            BoardError::Conflict(conflict.to_string())
        })
    }

    async fn begin_or_discard(
        &self,
        conflict: &'static str,
        uploads: &[Upload],
    ) -> Result<Box<dyn StoreTransaction>, BoardError> {
        match self.begin(conflict).await {
            Ok(tx) => Ok(tx),
            Err(e) => {
                self.discard(uploads).await;
                Err(e)
            }
        }
    }

    /// Commits on success; rolls back and discards uploads otherwise
    async fn finish<T>(
        &self,
        tx: Box<dyn StoreTransaction>,
        result: Result<T, FlowError>,
        uploads: &[Upload],
        conflict: &'static str,
    ) -> Result<T, BoardError> {
        let outcome = match result {
            Ok(value) => match tx.commit().await {
                Ok(()) => return Ok(value),
                Err(e) => Err(FlowError::Store(e)),
            },
            Err(cause) => {
                if let Err(e) = tx.rollback().await {
                    error!(error = %e, "Rollback failed");
                }
                Err(cause)
            }
        };

        self.discard(uploads).await;

        outcome.map_err(|cause| match cause {
            FlowError::NotFound(message) => BoardError::NotFound(message.to_string()),
            FlowError::Rejected(message) => BoardError::Conflict(message.to_string()),
            FlowError::Store(e) => {
                warn!(error = %e, "{}", conflict);
                BoardError::Conflict(conflict.to_string())
            }
        })
    }

    /// Unlinks uploads that no committed record points at
    async fn discard(&self, uploads: &[Upload]) {
        if uploads.is_empty() {
            return;
        }
        let paths: Vec<PathBuf> = uploads.iter().map(|u| u.path.clone()).collect();
        self.cleanup.unlink_all(paths).await;
    }

    async fn notify(&self, notification: Notification) {
        let subject = notification.subject.clone();
        if let Err(e) = self.notifier.send(notification).await {
            warn!(subject = %subject, error = %e, "Failed to send notification");
        }
    }
}

fn staff_name(admin_name: &str) -> &str {
    if admin_name.trim().is_empty() {
        DEFAULT_STAFF_NAME
    } else {
        admin_name
    }
}

async fn register_in(tx: &mut dyn StoreTransaction, client: &Client) -> Result<(), FlowError> {
    if tx.find_client_by_email(&client.email).await?.is_some() {
        return Err(FlowError::Rejected("This email is already registered"));
    }
    tx.insert_client(client).await?;
    Ok(())
}

async fn insert_uploads(
    tx: &mut dyn StoreTransaction,
    uploads: &[Upload],
) -> Result<Vec<Uuid>, FlowError> {
    let mut file_ids = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let record = FileRecord::new(
            upload.original_name.clone(),
            upload.path.to_string_lossy(),
            upload.size_bytes,
            upload.content_type.clone(),
        );
        tx.insert_file(&record).await?;
        file_ids.push(record.id);
    }
    Ok(file_ids)
}

async fn create_task_in(
    tx: &mut dyn StoreTransaction,
    input: &NewTask,
    uploads: &[Upload],
    admin_name: &str,
) -> Result<(TaskCreated, Notification), FlowError> {
    let client = tx
        .find_client(input.client_id)
        .await?
        .ok_or(FlowError::NotFound("Client not found"))?;

    let file_ids = insert_uploads(tx, uploads).await?;
    let admin_name = staff_name(admin_name).to_string();

    let Some(list) = tx
        .find_task_list_by_name(client.id, &input.task_list_name)
        .await?
    else {
        let list = TaskList::new(client.id, &input.task_list_name);
        tx.insert_task_list(&list).await?;

        let task = Task::new(client.id, list.id, &input.title, &input.description, file_ids.clone());
        tx.insert_task(&task).await?;
        tx.push_task(list.id, task.id).await?;
        tx.push_task_list(client.id, list.id).await?;

        return Ok((
            TaskCreated {
                message: "Task list and task has been successfully created".to_string(),
                task_list_id: list.id,
                task_id: task.id,
                file_ids,
            },
            assigned(&client, &list, &task, admin_name),
        ));
    };

    if let Some(task) = tx.find_task_in_list(list.id, &input.title).await? {
        tx.set_task_description(task.id, &input.description).await?;
        if !file_ids.is_empty() {
            tx.push_task_files(task.id, &file_ids).await?;
        }

        let notification = Notification::new(
            &client.email,
            "New file(s) were added to your task",
            NotificationEvent::TaskUpdated {
                task_id: task.id,
                task_title: task.title.clone(),
                admin_name,
            },
        );

        return Ok((
            TaskCreated {
                message: "Task updated".to_string(),
                task_list_id: list.id,
                task_id: task.id,
                file_ids,
            },
            notification,
        ));
    }

    let task = Task::new(client.id, list.id, &input.title, &input.description, file_ids.clone());
    tx.insert_task(&task).await?;
    tx.push_task(list.id, task.id).await?;

    Ok((
        TaskCreated {
            message: "Task created and added into task list".to_string(),
            task_list_id: list.id,
            task_id: task.id,
            file_ids,
        },
        assigned(&client, &list, &task, admin_name),
    ))
}

fn assigned(client: &Client, list: &TaskList, task: &Task, admin_name: String) -> Notification {
    Notification::new(
        &client.email,
        "New task added",
        NotificationEvent::TaskAssigned {
            task_id: task.id,
            task_title: task.title.clone(),
            task_list_name: list.name.clone(),
            admin_name,
        },
    )
}

async fn leave_comment_in(
    tx: &mut dyn StoreTransaction,
    author_id: Uuid,
    input: &NewComment,
    uploads: &[Upload],
    staff_inbox: &str,
) -> Result<(Comment, Notification), FlowError> {
    let task = tx
        .find_task(input.task_id)
        .await?
        .ok_or(FlowError::NotFound("Task not found"))?;

    let client = tx
        .find_client(task.client_id)
        .await?
        .ok_or(FlowError::NotFound("Client not found"))?;

    let author = tx
        .find_client(author_id)
        .await?
        .ok_or(FlowError::NotFound("User not found"))?;

    let file_ids = insert_uploads(tx, uploads).await?;
    let comment = Comment::new(task.id, author.id, &input.body, file_ids.clone());

    if !tx.push_comment(&comment).await? {
        return Err(FlowError::NotFound("Task not found"));
    }

    if author.role.is_admin() {
        let notification = Notification::new(
            &client.email,
            format!("Admin left comment to task {}", task.title),
            NotificationEvent::AdminComment {
                task_id: task.id,
                task_title: task.title.clone(),
                comment: comment.body.clone(),
            },
        );
        return Ok((comment, notification));
    }

    tx.set_task_status(task.id, TaskStatus::NeedsReview).await?;

    let activity = Activity::new(
        client.id,
        task.task_list_id,
        task.id,
        Some(comment.id),
        &input.body,
        file_ids,
    );
    tx.insert_activity(&activity).await?;

    let notification = Notification::new(
        staff_inbox,
        format!("Client {} left comment to task", author.display_name()),
        NotificationEvent::ClientComment {
            task_id: task.id,
            task_title: task.title.clone(),
            client_name: author.display_name().to_string(),
            comment: comment.body.clone(),
        },
    );

    Ok((comment, notification))
}

async fn change_status_in(
    tx: &mut dyn StoreTransaction,
    task_id: Uuid,
    status: TaskStatus,
    admin_name: &str,
) -> Result<(Task, Notification), FlowError> {
    let task = tx
        .find_task(task_id)
        .await?
        .ok_or(FlowError::NotFound("Task not found"))?;

    let client = tx
        .find_client(task.client_id)
        .await?
        .ok_or(FlowError::NotFound("Client for this task not found"))?;

    let admin_name = staff_name(admin_name);

    tx.set_task_status(task.id, status).await?;
    tx.push_comment(&Comment::system(
        task.id,
        client.id,
        format!("{} changed the task status: {}", admin_name, status),
    ))
    .await?;

    let task = tx
        .find_task(task.id)
        .await?
        .ok_or(FlowError::NotFound("Task not found"))?;

    let notification = Notification::new(
        &client.email,
        format!("Task ({}) changed status", task.title),
        NotificationEvent::StatusChanged {
            task_id: task.id,
            task_title: task.title.clone(),
            status,
            admin_name: admin_name.to_string(),
        },
    );

    Ok((task, notification))
}

async fn change_role_in(
    tx: &mut dyn StoreTransaction,
    client_id: Uuid,
    role: ClientRole,
) -> Result<Client, FlowError> {
    if !tx.set_client_role(client_id, role).await? {
        return Err(FlowError::NotFound("Client not found"));
    }
    tx.find_client(client_id)
        .await?
        .ok_or(FlowError::NotFound("Client not found"))
}

async fn rename_in(
    tx: &mut dyn StoreTransaction,
    task_list_id: Uuid,
    name: &str,
) -> Result<TaskList, FlowError> {
    let list = tx
        .find_task_list(task_list_id)
        .await?
        .ok_or(FlowError::NotFound("Task list not found"))?;

    if list.name != name {
        tx.rename_task_list(list.id, name).await?;
    }

    tx.find_task_list(list.id)
        .await?
        .ok_or(FlowError::NotFound("Task list not found"))
}

async fn edit_task_in(
    tx: &mut dyn StoreTransaction,
    task_id: Uuid,
    input: &EditTask,
) -> Result<Task, FlowError> {
    if !tx
        .set_task_details(task_id, &input.title, &input.description)
        .await?
    {
        return Err(FlowError::NotFound("Task not found"));
    }
    tx.find_task(task_id)
        .await?
        .ok_or(FlowError::NotFound("Task not found"))
}

async fn edit_comment_in(
    tx: &mut dyn StoreTransaction,
    task_id: Uuid,
    comment_id: Uuid,
    body: &str,
) -> Result<Comment, FlowError> {
    let task = tx
        .find_task(task_id)
        .await?
        .ok_or(FlowError::NotFound("Task not found"))?;

    if task.comment(comment_id).is_none() {
        return Err(FlowError::NotFound("Comment not found"));
    }

    tx.set_comment_body(task.id, comment_id, body).await?;

    let task = tx
        .find_task(task.id)
        .await?
        .ok_or(FlowError::NotFound("Task not found"))?;
    task.comment(comment_id)
        .cloned()
        .ok_or(FlowError::NotFound("Comment not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_name_falls_back_when_blank() {
        assert_eq!(staff_name(""), DEFAULT_STAFF_NAME);
        assert_eq!(staff_name("  "), DEFAULT_STAFF_NAME);
        assert_eq!(staff_name("Anna"), "Anna");
    }
}
