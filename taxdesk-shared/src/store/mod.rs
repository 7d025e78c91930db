/// Document-store seam
///
/// Everything that mutates the entity graph goes through a
/// [`StoreTransaction`] opened by a [`DocumentStore`]. The cascade manager and
/// the task board are written against these traits only, so the same walk
/// runs on PostgreSQL in production and on the in-memory store in tests.
///
/// # Implementations
///
/// - [`postgres::PgStore`]: sqlx transaction over a `PgPool`
/// - [`memory::MemoryStore`]: snapshot-isolated in-process store with fault
///   injection
///
/// # Transaction contract
///
/// ```text
/// DocumentStore::begin()
///   ├─> reads / writes on the StoreTransaction
///   ├─> commit()    every write becomes visible at once
///   └─> rollback()  no write becomes visible
/// ```
///
/// Dropping a transaction without committing behaves like `rollback`.
///
/// The orphaned-file queue is deliberately outside the transaction: it is only
/// written after a commit, when the records are already gone.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    activity::{Activity, ActivityScope},
    client::{Client, ClientRole},
    comment::Comment,
    file::FileRecord,
    orphan::OrphanedFile,
    task::{Task, TaskStatus},
    task_list::TaskList,
};

pub mod memory;
pub mod postgres;

pub use memory::{Fault, MemoryStore, Snapshot};
pub use postgres::PgStore;

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique or foreign key rule rejected a write
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Another transaction committed a conflicting write first
    #[error("Write conflict: the data changed since the transaction began")]
    WriteConflict,

    /// Failure injected by [`MemoryStore`]
    #[error("Injected failure: {0}")]
    Injected(String),

    /// Schema migration failure
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Store result type alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Opens transactions and owns the orphaned-file queue
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Starts a new transaction
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    /// Queues paths whose post-commit unlink failed, with the error text
    async fn record_orphans(&self, orphans: &[(String, String)]) -> StoreResult<()>;

    /// Oldest queued orphans, at most `limit`
    async fn pending_orphans(&self, limit: usize) -> StoreResult<Vec<OrphanedFile>>;

    /// Removes an orphan from the queue once its path is gone
    async fn resolve_orphan(&self, id: Uuid) -> StoreResult<()>;

    /// Records another failed attempt for a queued orphan
    async fn note_orphan_failure(&self, id: Uuid, error: &str) -> StoreResult<()>;
}

/// One unit of work against the store
///
/// Mutators return whether a record was affected, so callers can tell a
/// missing target from a successful update.
#[async_trait]
pub trait StoreTransaction: Send {
    // Reads

    async fn find_client(&mut self, id: Uuid) -> StoreResult<Option<Client>>;

    async fn find_client_by_email(&mut self, email: &str) -> StoreResult<Option<Client>>;

    /// Every account, oldest first
    async fn list_clients(&mut self) -> StoreResult<Vec<Client>>;

    async fn find_task_list(&mut self, id: Uuid) -> StoreResult<Option<TaskList>>;

    async fn find_task_list_by_name(
        &mut self,
        client_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<TaskList>>;

    /// Loads a task together with its comments
    async fn find_task(&mut self, id: Uuid) -> StoreResult<Option<Task>>;

    async fn find_task_in_list(
        &mut self,
        task_list_id: Uuid,
        title: &str,
    ) -> StoreResult<Option<Task>>;

    async fn find_file(&mut self, id: Uuid) -> StoreResult<Option<FileRecord>>;

    async fn find_activities(&mut self, scope: ActivityScope) -> StoreResult<Vec<Activity>>;

    // Locking reads
    //
    // The cascade walk reads its roots through these so no other transaction
    // can attach children to a record between the read and its deletion.
    // Stores that detect conflicts at commit keep the plain reads.

    async fn find_client_for_update(&mut self, id: Uuid) -> StoreResult<Option<Client>> {
        self.find_client(id).await
    }

    async fn find_task_list_for_update(&mut self, id: Uuid) -> StoreResult<Option<TaskList>> {
        self.find_task_list(id).await
    }

    async fn find_task_for_update(&mut self, id: Uuid) -> StoreResult<Option<Task>> {
        self.find_task(id).await
    }

    // Inserts

    async fn insert_client(&mut self, client: &Client) -> StoreResult<()>;

    async fn insert_task_list(&mut self, list: &TaskList) -> StoreResult<()>;

    async fn insert_task(&mut self, task: &Task) -> StoreResult<()>;

    async fn insert_file(&mut self, file: &FileRecord) -> StoreResult<()>;

    async fn insert_activity(&mut self, activity: &Activity) -> StoreResult<()>;

    // Reference arrays

    async fn push_task_list(&mut self, client_id: Uuid, task_list_id: Uuid) -> StoreResult<bool>;

    async fn pull_task_list(&mut self, client_id: Uuid, task_list_id: Uuid) -> StoreResult<bool>;

    async fn push_task(&mut self, task_list_id: Uuid, task_id: Uuid) -> StoreResult<bool>;

    async fn pull_task(&mut self, task_list_id: Uuid, task_id: Uuid) -> StoreResult<bool>;

    async fn push_task_files(&mut self, task_id: Uuid, file_ids: &[Uuid]) -> StoreResult<bool>;

    /// Removes a file id from the task, its comments and any activity row
    ///
    /// Returns true when at least one reference was removed.
    async fn pull_file(&mut self, task_id: Uuid, file_id: Uuid) -> StoreResult<bool>;

    /// Appends a comment to its task's thread
    async fn push_comment(&mut self, comment: &Comment) -> StoreResult<bool>;

    /// Removes a comment from its task's thread
    async fn pull_comment(&mut self, task_id: Uuid, comment_id: Uuid) -> StoreResult<bool>;

    // Field updates

    async fn set_client_role(&mut self, client_id: Uuid, role: ClientRole) -> StoreResult<bool>;

    /// Fails with `Constraint` when the owner already has a list with that name
    async fn rename_task_list(&mut self, task_list_id: Uuid, name: &str) -> StoreResult<bool>;

    async fn set_task_details(
        &mut self,
        task_id: Uuid,
        title: &str,
        description: &str,
    ) -> StoreResult<bool>;

    async fn set_comment_body(
        &mut self,
        task_id: Uuid,
        comment_id: Uuid,
        body: &str,
    ) -> StoreResult<bool>;

    async fn set_task_status(&mut self, task_id: Uuid, status: TaskStatus) -> StoreResult<bool>;

    async fn set_task_description(&mut self, task_id: Uuid, description: &str)
        -> StoreResult<bool>;

    // Deletes

    async fn delete_file(&mut self, id: Uuid) -> StoreResult<bool>;

    /// Deletes the task and its embedded comments
    async fn delete_task(&mut self, id: Uuid) -> StoreResult<bool>;

    async fn delete_task_list(&mut self, id: Uuid) -> StoreResult<bool>;

    async fn delete_client(&mut self, id: Uuid) -> StoreResult<bool>;

    /// Deletes every activity row in `scope`, returning how many went
    async fn delete_activities(&mut self, scope: ActivityScope) -> StoreResult<u64>;

    // Completion

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
