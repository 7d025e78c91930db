/// Cascade Consistency Manager
///
/// Deletes an entity together with everything that depends on it as one
/// all-or-nothing unit of work, then removes the uploaded files from disk.
///
/// # Lifecycle of a delete
///
/// ```text
/// begin ─> collect ─> delete children ─> delete self ─> commit ─> unlink disk
///   │         │              │                │            │
///   └─────────┴──────────────┴────────────────┴────────────┴─> rollback (no unlink)
/// ```
///
/// Disk unlink happens strictly after commit. An unlink that fails there is
/// logged and queued as an orphan; the delete still succeeds because the
/// store is already consistent.
///
/// # Errors
///
/// Callers only ever see two categories:
/// - [`CascadeError::NotFound`]: the root does not exist; nothing was changed
/// - [`CascadeError::Conflict`]: anything else; the transaction was rolled
///   back and the cause is kept as the error source for logging
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use taxdesk_shared::cascade::CascadeManager;
/// use taxdesk_shared::files::{DiskRemover, PostCommitCleanup};
/// use taxdesk_shared::store::{DocumentStore, MemoryStore};
///
/// # async fn example() {
/// let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
/// let cleanup = PostCommitCleanup::new(store.clone(), Arc::new(DiskRemover));
/// let cascade = CascadeManager::new(store, cleanup);
///
/// let result = cascade.delete_client(uuid::Uuid::new_v4()).await;
/// assert!(result.is_err());
/// # }
/// ```

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::files::PostCommitCleanup;
use crate::store::DocumentStore;

mod plan;
mod walk;

pub use plan::{DeletionPlan, WalkError};

/// Cascade error types
#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    /// The entity to delete does not exist
    #[error("{0}")]
    NotFound(String),

    /// The delete was aborted and rolled back
    #[error("{message}")]
    Conflict {
        message: String,
        #[source]
        source: WalkError,
    },
}

impl CascadeError {
    pub fn message(&self) -> &str {
        match self {
            CascadeError::NotFound(message) => message,
            CascadeError::Conflict { message, .. } => message,
        }
    }
}

/// Result of a committed delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub message: String,

    /// Paths removed from disk (or already absent)
    pub unlinked: Vec<PathBuf>,

    /// Paths that could not be removed and were queued for the sweeper
    pub orphaned: Vec<PathBuf>,
}

/// Entity a delete starts from, with the parent the caller expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    Client(Uuid),
    TaskList { id: Uuid, owner: Uuid },
    Task { id: Uuid, task_list: Uuid },
    File { id: Uuid, task: Uuid },
    Comment { task: Uuid, comment: Uuid },
}

impl Root {
    fn kind(&self) -> &'static str {
        match self {
            Root::Client(_) => "client",
            Root::TaskList { .. } => "task_list",
            Root::Task { .. } => "task",
            Root::File { .. } => "file",
            Root::Comment { .. } => "comment",
        }
    }

    fn id(&self) -> Uuid {
        match *self {
            Root::Client(id)
            | Root::TaskList { id, .. }
            | Root::Task { id, .. }
            | Root::File { id, .. } => id,
            Root::Comment { comment, .. } => comment,
        }
    }

    fn success_message(&self) -> &'static str {
        match self {
            Root::Client(_) => "Client has been successfully deleted",
            Root::TaskList { .. } => "Task list has been successfully deleted",
            Root::Task { .. } => "Task has been successfully deleted",
            Root::File { .. } => "File has been successfully deleted",
            Root::Comment { .. } => "Task comment has been successfully deleted",
        }
    }

    fn conflict_message(&self) -> &'static str {
        match self {
            Root::Client(_) => "Error when deleting client account",
            Root::TaskList { .. } => "Error occurred when deleting task list",
            Root::Task { .. } => "Error occurred when deleting task",
            Root::File { .. } => "Error occurred when deleting file",
            Root::Comment { .. } => "Error when deleting task comment",
        }
    }

    fn fail(&self, cause: WalkError) -> CascadeError {
        match cause {
            WalkError::NotFound(message) => CascadeError::NotFound(message.to_string()),
            source => {
                warn!(
                    root = self.kind(),
                    id = %self.id(),
                    error = %source,
                    "Cascade delete aborted"
                );
                CascadeError::Conflict {
                    message: self.conflict_message().to_string(),
                    source,
                }
            }
        }
    }
}

/// Runs cascade deletes against a document store
#[derive(Clone)]
pub struct CascadeManager {
    store: Arc<dyn DocumentStore>,
    cleanup: PostCommitCleanup,
}

impl CascadeManager {
    pub fn new(store: Arc<dyn DocumentStore>, cleanup: PostCommitCleanup) -> Self {
        Self { store, cleanup }
    }

    /// Deletes a client with its task lists, tasks, comments, files and
    /// activity rows
    pub async fn delete_client(&self, client_id: Uuid) -> Result<DeleteOutcome, CascadeError> {
        self.execute(Root::Client(client_id)).await
    }

    /// Deletes a task list owned by `owner_id` and everything below it
    pub async fn delete_task_list(
        &self,
        task_list_id: Uuid,
        owner_id: Uuid,
    ) -> Result<DeleteOutcome, CascadeError> {
        self.execute(Root::TaskList {
            id: task_list_id,
            owner: owner_id,
        })
        .await
    }

    /// Deletes a task of `task_list_id` with its comments and files
    pub async fn delete_task(
        &self,
        task_id: Uuid,
        task_list_id: Uuid,
    ) -> Result<DeleteOutcome, CascadeError> {
        self.execute(Root::Task {
            id: task_id,
            task_list: task_list_id,
        })
        .await
    }

    /// Deletes one file attached to `task_id` or one of its comments
    pub async fn delete_file(
        &self,
        file_id: Uuid,
        task_id: Uuid,
    ) -> Result<DeleteOutcome, CascadeError> {
        self.execute(Root::File {
            id: file_id,
            task: task_id,
        })
        .await
    }

    /// Deletes one comment of a task with its files and activity rows
    pub async fn delete_comment(
        &self,
        task_id: Uuid,
        comment_id: Uuid,
    ) -> Result<DeleteOutcome, CascadeError> {
        self.execute(Root::Comment {
            task: task_id,
            comment: comment_id,
        })
        .await
    }

    async fn execute(&self, root: Root) -> Result<DeleteOutcome, CascadeError> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| root.fail(WalkError::Store(e)))?;

        let plan = match walk::walk(tx.as_mut(), root).await {
            Ok(plan) => plan,
            Err(cause) => {
                if let Err(e) = tx.rollback().await {
                    error!(root = root.kind(), id = %root.id(), error = %e, "Rollback failed");
                }
                return Err(root.fail(cause));
            }
        };

        if let Err(e) = tx.commit().await {
            return Err(root.fail(WalkError::Store(e)));
        }

        let paths = plan.into_paths();
        info!(
            root = root.kind(),
            id = %root.id(),
            files = paths.len(),
            "Cascade delete committed"
        );

        let report = self.cleanup.unlink_all(paths).await;

        Ok(DeleteOutcome {
            message: root.success_message().to_string(),
            unlinked: report.unlinked,
            orphaned: report.orphaned,
        })
    }
}
