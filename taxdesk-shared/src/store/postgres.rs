/// PostgreSQL-backed document store
///
/// Each [`StoreTransaction`] wraps one sqlx transaction; every call delegates
/// to the query functions in [`crate::models`] on that transaction's
/// connection. Rolling back (or dropping the transaction) discards every
/// write, including reference-array updates.
///
/// # Example
///
/// ```no_run
/// use taxdesk_shared::db::pool::DatabaseConfig;
/// use taxdesk_shared::store::{DocumentStore, PgStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PgStore::connect(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// let mut tx = store.begin().await?;
/// let _client = tx.find_client(uuid::Uuid::new_v4()).await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;
use tracing::{debug, error};
use uuid::Uuid;

use super::{DocumentStore, StoreError, StoreResult, StoreTransaction};
use crate::db::{
    migrations::run_migrations,
    pool::{create_pool, DatabaseConfig},
};
use crate::models::{
    activity::{Activity, ActivityScope},
    client::{Client, ClientRole},
    comment::Comment,
    file::FileRecord,
    orphan::OrphanedFile,
    task::{Task, TaskStatus},
    task_list::TaskList,
};

/// Document store over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the pool and brings the schema up to date
    pub async fn connect(config: DatabaseConfig) -> StoreResult<Self> {
        let pool = create_pool(config).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn record_orphans(&self, orphans: &[(String, String)]) -> StoreResult<()> {
        record_each(orphans, |path, error| OrphanedFile::record(&self.pool, path, error)).await
    }

    async fn pending_orphans(&self, limit: usize) -> StoreResult<Vec<OrphanedFile>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(OrphanedFile::list_pending(&self.pool, limit).await?)
    }

    async fn resolve_orphan(&self, id: Uuid) -> StoreResult<()> {
        OrphanedFile::resolve(&self.pool, id).await?;
        Ok(())
    }

    async fn note_orphan_failure(&self, id: Uuid, error: &str) -> StoreResult<()> {
        OrphanedFile::record_failure(&self.pool, id, error).await?;
        Ok(())
    }
}

/// One PostgreSQL transaction
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn find_client(&mut self, id: Uuid) -> StoreResult<Option<Client>> {
        Ok(Client::find_by_id(&mut *self.tx, id).await?)
    }

    async fn find_client_by_email(&mut self, email: &str) -> StoreResult<Option<Client>> {
        Ok(Client::find_by_email(&mut *self.tx, email).await?)
    }

    async fn list_clients(&mut self) -> StoreResult<Vec<Client>> {
        Ok(Client::list_all(&mut *self.tx).await?)
    }

    async fn find_task_list(&mut self, id: Uuid) -> StoreResult<Option<TaskList>> {
        Ok(TaskList::find_by_id(&mut *self.tx, id).await?)
    }

    async fn find_task_list_by_name(
        &mut self,
        client_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<TaskList>> {
        Ok(TaskList::find_by_name(&mut *self.tx, client_id, name).await?)
    }

    async fn find_task(&mut self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(Task::find_by_id(&mut *self.tx, id).await?)
    }

    async fn find_task_in_list(
        &mut self,
        task_list_id: Uuid,
        title: &str,
    ) -> StoreResult<Option<Task>> {
        Ok(Task::find_in_list_by_title(&mut *self.tx, task_list_id, title).await?)
    }

    async fn find_file(&mut self, id: Uuid) -> StoreResult<Option<FileRecord>> {
        Ok(FileRecord::find_by_id(&mut *self.tx, id).await?)
    }

    async fn find_activities(&mut self, scope: ActivityScope) -> StoreResult<Vec<Activity>> {
        Ok(Activity::list_scoped(&mut *self.tx, scope).await?)
    }

    async fn find_client_for_update(&mut self, id: Uuid) -> StoreResult<Option<Client>> {
        Ok(Client::find_by_id_for_update(&mut *self.tx, id).await?)
    }

    async fn find_task_list_for_update(&mut self, id: Uuid) -> StoreResult<Option<TaskList>> {
        Ok(TaskList::find_by_id_for_update(&mut *self.tx, id).await?)
    }

    async fn find_task_for_update(&mut self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(Task::find_by_id_for_update(&mut *self.tx, id).await?)
    }

    async fn insert_client(&mut self, client: &Client) -> StoreResult<()> {
        Ok(Client::insert(&mut *self.tx, client).await?)
    }

    async fn insert_task_list(&mut self, list: &TaskList) -> StoreResult<()> {
        Ok(TaskList::insert(&mut *self.tx, list).await?)
    }

    async fn insert_task(&mut self, task: &Task) -> StoreResult<()> {
        Ok(Task::insert(&mut *self.tx, task).await?)
    }

    async fn insert_file(&mut self, file: &FileRecord) -> StoreResult<()> {
        Ok(FileRecord::insert(&mut *self.tx, file).await?)
    }

    async fn insert_activity(&mut self, activity: &Activity) -> StoreResult<()> {
        Ok(Activity::insert(&mut *self.tx, activity).await?)
    }

    async fn push_task_list(&mut self, client_id: Uuid, task_list_id: Uuid) -> StoreResult<bool> {
        Ok(Client::push_task_list(&mut *self.tx, client_id, task_list_id).await?)
    }

    async fn pull_task_list(&mut self, client_id: Uuid, task_list_id: Uuid) -> StoreResult<bool> {
        Ok(Client::pull_task_list(&mut *self.tx, client_id, task_list_id).await?)
    }

    async fn push_task(&mut self, task_list_id: Uuid, task_id: Uuid) -> StoreResult<bool> {
        Ok(TaskList::push_task(&mut *self.tx, task_list_id, task_id).await?)
    }

    async fn pull_task(&mut self, task_list_id: Uuid, task_id: Uuid) -> StoreResult<bool> {
        Ok(TaskList::pull_task(&mut *self.tx, task_list_id, task_id).await?)
    }

    async fn push_task_files(&mut self, task_id: Uuid, file_ids: &[Uuid]) -> StoreResult<bool> {
        Ok(Task::push_files(&mut *self.tx, task_id, file_ids).await?)
    }

    async fn pull_file(&mut self, task_id: Uuid, file_id: Uuid) -> StoreResult<bool> {
        let from_task = Task::pull_file(&mut *self.tx, task_id, file_id).await?;
        let from_comments = Comment::pull_file(&mut *self.tx, task_id, file_id).await?;
        let from_activities = Activity::pull_file(&mut *self.tx, file_id).await?;

        debug!(
            task_id = %task_id,
            file_id = %file_id,
            from_task,
            from_comments,
            from_activities,
            "Pulled file references"
        );

        Ok(from_task || from_comments > 0 || from_activities > 0)
    }

    async fn push_comment(&mut self, comment: &Comment) -> StoreResult<bool> {
        if !Task::touch(&mut *self.tx, comment.task_id).await? {
            return Ok(false);
        }
        Comment::insert(&mut *self.tx, comment).await?;
        Ok(true)
    }

    async fn pull_comment(&mut self, task_id: Uuid, comment_id: Uuid) -> StoreResult<bool> {
        Ok(Comment::delete(&mut *self.tx, task_id, comment_id).await?)
    }

    async fn set_client_role(&mut self, client_id: Uuid, role: ClientRole) -> StoreResult<bool> {
        Ok(Client::set_role(&mut *self.tx, client_id, role).await?)
    }

    async fn rename_task_list(&mut self, task_list_id: Uuid, name: &str) -> StoreResult<bool> {
        TaskList::rename(&mut *self.tx, task_list_id, name)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Constraint(format!("duplicate task list name {:?}", name))
                }
                other => StoreError::Database(other),
            })
    }

    async fn set_task_details(
        &mut self,
        task_id: Uuid,
        title: &str,
        description: &str,
    ) -> StoreResult<bool> {
        Ok(Task::set_details(&mut *self.tx, task_id, title, description).await?)
    }

    async fn set_comment_body(
        &mut self,
        task_id: Uuid,
        comment_id: Uuid,
        body: &str,
    ) -> StoreResult<bool> {
        Ok(Comment::set_body(&mut *self.tx, task_id, comment_id, body).await?)
    }

    async fn set_task_status(&mut self, task_id: Uuid, status: TaskStatus) -> StoreResult<bool> {
        Ok(Task::set_status(&mut *self.tx, task_id, status).await?)
    }

    async fn set_task_description(
        &mut self,
        task_id: Uuid,
        description: &str,
    ) -> StoreResult<bool> {
        Ok(Task::set_description(&mut *self.tx, task_id, description).await?)
    }

    async fn delete_file(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(FileRecord::delete(&mut *self.tx, id).await?)
    }

    async fn delete_task(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(Task::delete(&mut *self.tx, id).await?)
    }

    async fn delete_task_list(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(TaskList::delete(&mut *self.tx, id).await?)
    }

    async fn delete_client(&mut self, id: Uuid) -> StoreResult<bool> {
        Ok(Client::delete(&mut *self.tx, id).await?)
    }

    async fn delete_activities(&mut self, scope: ActivityScope) -> StoreResult<u64> {
        Ok(Activity::delete_scoped(&mut *self.tx, scope).await?)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Queues every orphan, continuing past rows that fail to insert
///
/// Returns the first failure once all rows have been attempted.
async fn record_each<'a, F, Fut>(orphans: &'a [(String, String)], mut insert: F) -> StoreResult<()>
where
    F: FnMut(&'a str, &'a str) -> Fut,
    Fut: Future<Output = Result<Uuid, sqlx::Error>>,
{
    let mut first_failure = None;

    for (path, reason) in orphans {
        match insert(path.as_str(), reason.as_str()).await {
            Ok(id) => debug!(orphan_id = %id, path = %path, "Queued orphaned file"),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to queue orphaned file");
                first_failure.get_or_insert(e);
            }
        }
    }

    match first_failure {
        Some(e) => Err(StoreError::Database(e)),
        None => Ok(()),
    }
}
