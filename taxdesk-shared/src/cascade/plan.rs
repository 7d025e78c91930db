/// Deletion plan collected during a walk
///
/// The plan deletes file records as it meets them and remembers their disk
/// paths for the post-commit phase. Each file is handled once, however many
/// times the walk reaches it.

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::task::Task;
use crate::store::{StoreError, StoreTransaction};

/// Why a walk stopped
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    /// The root entity does not exist
    #[error("{0}")]
    NotFound(&'static str),

    /// A reference array names a record that does not exist
    #[error("{kind} {id} is referenced but missing")]
    Dangling { kind: &'static str, id: Uuid },

    /// The caller's parent does not match the stored one
    #[error("{0}")]
    Mismatch(String),

    /// A write found nothing to change
    #[error("{kind} {id} vanished during the walk")]
    Vanished { kind: &'static str, id: Uuid },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Files deleted so far and the paths to unlink after commit
#[derive(Debug, Default)]
pub struct DeletionPlan {
    seen: HashSet<Uuid>,
    paths: Vec<PathBuf>,
}

impl DeletionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes the file record and queues its path
    ///
    /// A file id without a record is skipped: there is nothing to delete and
    /// nothing to unlink.
    pub async fn purge_file(
        &mut self,
        tx: &mut dyn StoreTransaction,
        file_id: Uuid,
    ) -> Result<(), WalkError> {
        if !self.seen.insert(file_id) {
            debug!(file_id = %file_id, "File already purged");
            return Ok(());
        }

        let Some(file) = tx.find_file(file_id).await? else {
            warn!(file_id = %file_id, "Referenced file record is missing, skipping");
            return Ok(());
        };

        tx.delete_file(file.id).await?;
        self.paths.push(PathBuf::from(file.path));
        Ok(())
    }

    /// Purges every file reachable from the task: comment files first, then
    /// the task's own
    pub async fn purge_task_files(
        &mut self,
        tx: &mut dyn StoreTransaction,
        task: &Task,
    ) -> Result<(), WalkError> {
        for file_id in task.reachable_file_ids() {
            self.purge_file(tx, file_id).await?;
        }
        Ok(())
    }

    /// Records a path whose record was already removed by the caller
    pub fn queue_path(&mut self, file_id: Uuid, path: impl Into<PathBuf>) {
        if self.seen.insert(file_id) {
            self.paths.push(path.into());
        }
    }

    pub fn file_count(&self) -> usize {
        self.paths.len()
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file::FileRecord;
    use crate::store::{DocumentStore, MemoryStore};

    #[tokio::test]
    async fn test_file_reached_twice_is_purged_once() {
        let store = MemoryStore::new();
        let file = FileRecord::new("w2.pdf", "/uploads/w2.pdf", 10, "application/pdf");

        let mut tx = store.begin().await.unwrap();
        tx.insert_file(&file).await.unwrap();

        let mut plan = DeletionPlan::new();
        plan.purge_file(tx.as_mut(), file.id).await.unwrap();
        plan.purge_file(tx.as_mut(), file.id).await.unwrap();

        assert_eq!(plan.into_paths(), vec![PathBuf::from("/uploads/w2.pdf")]);
    }

    #[tokio::test]
    async fn test_missing_file_record_is_skipped() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let mut plan = DeletionPlan::new();
        plan.purge_file(tx.as_mut(), Uuid::new_v4()).await.unwrap();

        assert_eq!(plan.file_count(), 0);
    }
}
