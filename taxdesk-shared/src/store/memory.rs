/// In-memory document store
///
/// Holds the whole entity graph behind one async mutex. A transaction works on
/// a private copy of the graph taken at `begin`; `commit` swaps the copy in,
/// `rollback` (or drop) throws it away. Commits are serialized with a store
/// version: a transaction whose snapshot is older than the current version
/// fails with [`StoreError::WriteConflict`] and its caller has to retry.
///
/// The store enforces the same constraints as the PostgreSQL schema (unique
/// email, unique task list name per client, parents must exist on insert and
/// may not be deleted while children point at them), so a walk that deletes in
/// the wrong order fails here too.
///
/// # Fault injection
///
/// [`MemoryStore::inject_fault`] arms a [`Fault`] for the next transaction
/// only, which lets tests abort a cascade half-way or at commit.
///
/// # Example
///
/// ```
/// use taxdesk_shared::models::client::{Client, ClientRole};
/// use taxdesk_shared::store::{DocumentStore, MemoryStore};
///
/// # async fn example() -> Result<(), taxdesk_shared::store::StoreError> {
/// let store = MemoryStore::new();
/// let client = Client::new("max@example.com", "hash", ClientRole::Client);
///
/// let mut tx = store.begin().await?;
/// tx.insert_client(&client).await?;
/// tx.commit().await?;
///
/// assert!(store.snapshot().await.clients.contains_key(&client.id));
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{DocumentStore, StoreError, StoreResult, StoreTransaction};
use crate::models::{
    activity::{Activity, ActivityScope},
    client::{Client, ClientRole},
    comment::Comment,
    file::FileRecord,
    orphan::OrphanedFile,
    task::{Task, TaskStatus},
    task_list::TaskList,
};

/// Failure to inject into the next transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Let this many writes succeed, then fail the next one
    AfterWrites(usize),

    /// Fail at commit, after every write succeeded
    OnCommit,
}

/// Copy of the stored entity graph
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub clients: HashMap<Uuid, Client>,
    pub task_lists: HashMap<Uuid, TaskList>,
    pub tasks: HashMap<Uuid, Task>,
    pub files: HashMap<Uuid, FileRecord>,
    pub activities: Vec<Activity>,
}

impl Snapshot {
    /// Activity rows in `scope`
    pub fn activities_in(&self, scope: ActivityScope) -> Vec<&Activity> {
        self.activities.iter().filter(|a| scope.matches(a)).collect()
    }

    /// Whether any stored record still mentions the id
    pub fn references(&self, id: Uuid) -> bool {
        self.clients.values().any(|c| c.task_list_ids.contains(&id))
            || self.task_lists.values().any(|l| l.task_ids.contains(&id))
            || self.tasks.values().any(|t| t.references_file(id))
            || self.activities.iter().any(|a| a.file_ids.contains(&id))
    }
}

#[derive(Debug, Default)]
struct Shared {
    graph: Snapshot,
    version: u64,
    orphans: Vec<OrphanedFile>,
    fault: Option<Fault>,
}

/// Snapshot-isolated in-process store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a fault for the next transaction
    pub async fn inject_fault(&self, fault: Fault) {
        self.shared.lock().await.fault = Some(fault);
    }

    /// Copy of the committed graph
    pub async fn snapshot(&self) -> Snapshot {
        self.shared.lock().await.graph.clone()
    }

    /// Number of committed transactions so far
    pub async fn version(&self) -> u64 {
        self.shared.lock().await.version
    }

    /// Queued orphaned files
    pub async fn orphans(&self) -> Vec<OrphanedFile> {
        self.shared.lock().await.orphans.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let mut shared = self.shared.lock().await;

        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            base_version: shared.version,
            graph: shared.graph.clone(),
            fault: shared.fault.take(),
            writes: 0,
        }))
    }

    async fn record_orphans(&self, orphans: &[(String, String)]) -> StoreResult<()> {
        let now = Utc::now();
        let mut shared = self.shared.lock().await;

        for (path, error) in orphans {
            shared.orphans.push(OrphanedFile {
                id: Uuid::new_v4(),
                path: path.clone(),
                attempts: 1,
                last_error: Some(error.clone()),
                created_at: now,
                last_attempt_at: Some(now),
            });
        }
        Ok(())
    }

    async fn pending_orphans(&self, limit: usize) -> StoreResult<Vec<OrphanedFile>> {
        let shared = self.shared.lock().await;
        Ok(shared.orphans.iter().take(limit).cloned().collect())
    }

    async fn resolve_orphan(&self, id: Uuid) -> StoreResult<()> {
        self.shared.lock().await.orphans.retain(|o| o.id != id);
        Ok(())
    }

    async fn note_orphan_failure(&self, id: Uuid, error: &str) -> StoreResult<()> {
        let mut shared = self.shared.lock().await;
        if let Some(orphan) = shared.orphans.iter_mut().find(|o| o.id == id) {
            orphan.attempts += 1;
            orphan.last_error = Some(error.to_string());
            orphan.last_attempt_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Transaction over a private copy of the graph
pub struct MemoryTransaction {
    shared: Arc<Mutex<Shared>>,
    base_version: u64,
    graph: Snapshot,
    fault: Option<Fault>,
    writes: usize,
}

impl MemoryTransaction {
    /// Counts a write and fires an armed `AfterWrites` fault
    fn write(&mut self) -> StoreResult<()> {
        if let Some(Fault::AfterWrites(limit)) = self.fault {
            if self.writes >= limit {
                return Err(StoreError::Injected(format!(
                    "write {} rejected after {} allowed",
                    self.writes + 1,
                    limit
                )));
            }
        }
        self.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_client(&mut self, id: Uuid) -> StoreResult<Option<Client>> {
        Ok(self.graph.clients.get(&id).cloned())
    }

    async fn find_client_by_email(&mut self, email: &str) -> StoreResult<Option<Client>> {
        Ok(self
            .graph
            .clients
            .values()
            .find(|c| c.email == email)
            .cloned())
    }

    async fn list_clients(&mut self) -> StoreResult<Vec<Client>> {
        let mut clients: Vec<Client> = self.graph.clients.values().cloned().collect();
        clients.sort_by_key(|c| c.created_at);
        Ok(clients)
    }

    async fn find_task_list(&mut self, id: Uuid) -> StoreResult<Option<TaskList>> {
        Ok(self.graph.task_lists.get(&id).cloned())
    }

    async fn find_task_list_by_name(
        &mut self,
        client_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<TaskList>> {
        Ok(self
            .graph
            .task_lists
            .values()
            .find(|l| l.client_id == client_id && l.name == name)
            .cloned())
    }

    async fn find_task(&mut self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.graph.tasks.get(&id).cloned())
    }

    async fn find_task_in_list(
        &mut self,
        task_list_id: Uuid,
        title: &str,
    ) -> StoreResult<Option<Task>> {
        Ok(self
            .graph
            .tasks
            .values()
            .filter(|t| t.task_list_id == task_list_id && t.title == title)
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn find_file(&mut self, id: Uuid) -> StoreResult<Option<FileRecord>> {
        Ok(self.graph.files.get(&id).cloned())
    }

    async fn find_activities(&mut self, scope: ActivityScope) -> StoreResult<Vec<Activity>> {
        Ok(self
            .graph
            .activities_in(scope)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn insert_client(&mut self, client: &Client) -> StoreResult<()> {
        self.write()?;
        if self.graph.clients.values().any(|c| c.email == client.email) {
            return Err(StoreError::Constraint(format!(
                "duplicate email {}",
                client.email
            )));
        }
        self.graph.clients.insert(client.id, client.clone());
        Ok(())
    }

    async fn insert_task_list(&mut self, list: &TaskList) -> StoreResult<()> {
        self.write()?;
        if !self.graph.clients.contains_key(&list.client_id) {
            return Err(StoreError::Constraint(format!(
                "task list {} points at missing client {}",
                list.id, list.client_id
            )));
        }
        if self
            .graph
            .task_lists
            .values()
            .any(|l| l.client_id == list.client_id && l.name == list.name)
        {
            return Err(StoreError::Constraint(format!(
                "duplicate task list name {:?}",
                list.name
            )));
        }
        self.graph.task_lists.insert(list.id, list.clone());
        Ok(())
    }

    async fn insert_task(&mut self, task: &Task) -> StoreResult<()> {
        self.write()?;
        if !self.graph.clients.contains_key(&task.client_id)
            || !self.graph.task_lists.contains_key(&task.task_list_id)
        {
            return Err(StoreError::Constraint(format!(
                "task {} points at a missing client or task list",
                task.id
            )));
        }
        self.graph.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn insert_file(&mut self, file: &FileRecord) -> StoreResult<()> {
        self.write()?;
        self.graph.files.insert(file.id, file.clone());
        Ok(())
    }

    async fn insert_activity(&mut self, activity: &Activity) -> StoreResult<()> {
        self.write()?;
        self.graph.activities.push(activity.clone());
        Ok(())
    }

    async fn push_task_list(&mut self, client_id: Uuid, task_list_id: Uuid) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.clients.get_mut(&client_id) {
            Some(client) => {
                client.task_list_ids.push(task_list_id);
                client.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn pull_task_list(&mut self, client_id: Uuid, task_list_id: Uuid) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.clients.get_mut(&client_id) {
            Some(client) => {
                client.task_list_ids.retain(|id| *id != task_list_id);
                client.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn push_task(&mut self, task_list_id: Uuid, task_id: Uuid) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.task_lists.get_mut(&task_list_id) {
            Some(list) => {
                list.task_ids.push(task_id);
                list.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn pull_task(&mut self, task_list_id: Uuid, task_id: Uuid) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.task_lists.get_mut(&task_list_id) {
            Some(list) => {
                list.task_ids.retain(|id| *id != task_id);
                list.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn push_task_files(&mut self, task_id: Uuid, file_ids: &[Uuid]) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.tasks.get_mut(&task_id) {
            Some(task) => {
                task.file_ids.extend_from_slice(file_ids);
                task.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn pull_file(&mut self, task_id: Uuid, file_id: Uuid) -> StoreResult<bool> {
        self.write()?;
        let mut removed = false;

        if let Some(task) = self.graph.tasks.get_mut(&task_id) {
            let before = task.file_ids.len();
            task.file_ids.retain(|id| *id != file_id);
            removed |= task.file_ids.len() != before;

            for comment in &mut task.comments {
                let before = comment.file_ids.len();
                comment.file_ids.retain(|id| *id != file_id);
                removed |= comment.file_ids.len() != before;
            }
        }

        for activity in &mut self.graph.activities {
            let before = activity.file_ids.len();
            activity.file_ids.retain(|id| *id != file_id);
            removed |= activity.file_ids.len() != before;
        }

        Ok(removed)
    }

    async fn push_comment(&mut self, comment: &Comment) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.tasks.get_mut(&comment.task_id) {
            Some(task) => {
                task.comments.push(comment.clone());
                task.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn pull_comment(&mut self, task_id: Uuid, comment_id: Uuid) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.tasks.get_mut(&task_id) {
            Some(task) => {
                let before = task.comments.len();
                task.comments.retain(|c| c.id != comment_id);
                task.comments.len() != before
            }
            None => false,
        })
    }

    async fn set_client_role(&mut self, client_id: Uuid, role: ClientRole) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.clients.get_mut(&client_id) {
            Some(client) => {
                client.role = role;
                client.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn rename_task_list(&mut self, task_list_id: Uuid, name: &str) -> StoreResult<bool> {
        self.write()?;
        let Some(owner) = self.graph.task_lists.get(&task_list_id).map(|l| l.client_id) else {
            return Ok(false);
        };
        if self
            .graph
            .task_lists
            .values()
            .any(|l| l.id != task_list_id && l.client_id == owner && l.name == name)
        {
            return Err(StoreError::Constraint(format!(
                "duplicate task list name {:?}",
                name
            )));
        }
        if let Some(list) = self.graph.task_lists.get_mut(&task_list_id) {
            list.name = name.to_string();
            list.updated_at = Utc::now();
        }
        Ok(true)
    }

    async fn set_task_details(
        &mut self,
        task_id: Uuid,
        title: &str,
        description: &str,
    ) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.tasks.get_mut(&task_id) {
            Some(task) => {
                task.title = title.to_string();
                task.description = description.to_string();
                task.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_comment_body(
        &mut self,
        task_id: Uuid,
        comment_id: Uuid,
        body: &str,
    ) -> StoreResult<bool> {
        self.write()?;
        let comment = self
            .graph
            .tasks
            .get_mut(&task_id)
            .and_then(|t| t.comments.iter_mut().find(|c| c.id == comment_id));
        Ok(match comment {
            Some(comment) => {
                comment.body = body.to_string();
                comment.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_task_status(&mut self, task_id: Uuid, status: TaskStatus) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.tasks.get_mut(&task_id) {
            Some(task) => {
                task.status = status;
                task.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_task_description(
        &mut self,
        task_id: Uuid,
        description: &str,
    ) -> StoreResult<bool> {
        self.write()?;
        Ok(match self.graph.tasks.get_mut(&task_id) {
            Some(task) => {
                task.description = description.to_string();
                task.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn delete_file(&mut self, id: Uuid) -> StoreResult<bool> {
        self.write()?;
        Ok(self.graph.files.remove(&id).is_some())
    }

    async fn delete_task(&mut self, id: Uuid) -> StoreResult<bool> {
        self.write()?;
        Ok(self.graph.tasks.remove(&id).is_some())
    }

    async fn delete_task_list(&mut self, id: Uuid) -> StoreResult<bool> {
        self.write()?;
        if self.graph.tasks.values().any(|t| t.task_list_id == id) {
            return Err(StoreError::Constraint(format!(
                "task list {} is still referenced by tasks",
                id
            )));
        }
        Ok(self.graph.task_lists.remove(&id).is_some())
    }

    async fn delete_client(&mut self, id: Uuid) -> StoreResult<bool> {
        self.write()?;
        if self.graph.task_lists.values().any(|l| l.client_id == id)
            || self.graph.tasks.values().any(|t| t.client_id == id)
        {
            return Err(StoreError::Constraint(format!(
                "client {} is still referenced by task lists or tasks",
                id
            )));
        }
        Ok(self.graph.clients.remove(&id).is_some())
    }

    async fn delete_activities(&mut self, scope: ActivityScope) -> StoreResult<u64> {
        self.write()?;
        let before = self.graph.activities.len();
        self.graph.activities.retain(|a| !scope.matches(a));
        Ok((before - self.graph.activities.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            shared,
            base_version,
            graph,
            fault,
            writes,
        } = *self;

        if fault == Some(Fault::OnCommit) {
            return Err(StoreError::Injected("commit rejected".to_string()));
        }

        let mut shared = shared.lock().await;
        if shared.version != base_version {
            return Err(StoreError::WriteConflict);
        }

        shared.graph = graph;
        shared.version += 1;
        debug!(version = shared.version, writes, "Committed memory transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!(writes = self.writes, "Rolled back memory transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::client::ClientRole;

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let client = Client::new("max@example.com", "hash", ClientRole::Client);

        let mut tx = store.begin().await.unwrap();
        tx.insert_client(&client).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.snapshot().await.clients.is_empty());
        assert_eq!(store.version().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_commit_conflicts() {
        let store = MemoryStore::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first
            .insert_client(&Client::new("a@example.com", "hash", ClientRole::Client))
            .await
            .unwrap();
        second
            .insert_client(&Client::new("b@example.com", "hash", ClientRole::Client))
            .await
            .unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StoreError::WriteConflict)
        ));
        assert_eq!(store.snapshot().await.clients.len(), 1);
    }

    #[tokio::test]
    async fn test_fault_fires_after_allowed_writes() {
        let store = MemoryStore::new();
        store.inject_fault(Fault::AfterWrites(1)).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_client(&Client::new("a@example.com", "hash", ClientRole::Client))
            .await
            .unwrap();
        let result = tx
            .insert_client(&Client::new("b@example.com", "hash", ClientRole::Client))
            .await;
        assert!(matches!(result, Err(StoreError::Injected(_))));

        // Faults are armed for one transaction only
        let mut tx = store.begin().await.unwrap();
        tx.insert_client(&Client::new("c@example.com", "hash", ClientRole::Client))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_parent_delete_rejected_while_children_exist() {
        let store = MemoryStore::new();
        let client = Client::new("max@example.com", "hash", ClientRole::Client);
        let list = TaskList::new(client.id, "Taxes 2024");

        let mut tx = store.begin().await.unwrap();
        tx.insert_client(&client).await.unwrap();
        tx.insert_task_list(&list).await.unwrap();

        assert!(matches!(
            tx.delete_client(client.id).await,
            Err(StoreError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_client(&Client::new("max@example.com", "hash", ClientRole::Client))
            .await
            .unwrap();
        let result = tx
            .insert_client(&Client::new("max@example.com", "other", ClientRole::Client))
            .await;

        assert!(matches!(result, Err(StoreError::Constraint(_))));
    }
}
