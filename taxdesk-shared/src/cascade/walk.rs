/// Graph walks, one per deletion root
///
/// Every walk runs inside the caller's transaction and deletes children
/// before their parents:
///
/// ```text
/// Client
///  └─ TaskList            (client.task_list_ids)
///      └─ Task            (task_list.task_ids)
///          ├─ Comment     (embedded)
///          │   └─ File    (comment.file_ids)
///          └─ File        (task.file_ids)
/// Activity rows are scoped by client, task list, task or comment id
/// ```
///
/// No walk touches the filesystem; paths are collected in the plan. Client,
/// task list and task rows are read with their locking variants, top down.

use tracing::debug;
use uuid::Uuid;

use super::plan::{DeletionPlan, WalkError};
use super::Root;
use crate::models::{activity::ActivityScope, task::Task};
use crate::store::StoreTransaction;

pub(crate) async fn walk(
    tx: &mut dyn StoreTransaction,
    root: Root,
) -> Result<DeletionPlan, WalkError> {
    let mut plan = DeletionPlan::new();

    match root {
        Root::Client(id) => walk_client(tx, &mut plan, id).await?,
        Root::TaskList { id, owner } => walk_task_list(tx, &mut plan, id, owner).await?,
        Root::Task { id, task_list } => walk_task(tx, &mut plan, id, task_list).await?,
        Root::File { id, task } => walk_file(tx, &mut plan, id, task).await?,
        Root::Comment { task, comment } => walk_comment(tx, &mut plan, task, comment).await?,
    }

    Ok(plan)
}

async fn walk_client(
    tx: &mut dyn StoreTransaction,
    plan: &mut DeletionPlan,
    client_id: Uuid,
) -> Result<(), WalkError> {
    let client = tx
        .find_client_for_update(client_id)
        .await?
        .ok_or(WalkError::NotFound("Client not found"))?;

    for list_id in &client.task_list_ids {
        let list = tx
            .find_task_list_for_update(*list_id)
            .await?
            .ok_or(WalkError::Dangling {
                kind: "Task list",
                id: *list_id,
            })?;

        if list.client_id != client.id {
            return Err(WalkError::Mismatch(format!(
                "task list {} belongs to client {}, not {}",
                list.id, list.client_id, client.id
            )));
        }

        for task_id in &list.task_ids {
            purge_task(tx, plan, *task_id).await?;
        }

        if !tx.delete_task_list(list.id).await? {
            return Err(WalkError::Vanished {
                kind: "Task list",
                id: list.id,
            });
        }
        debug!(task_list_id = %list.id, tasks = list.task_ids.len(), "Deleted task list");
    }

    let activities = tx.delete_activities(ActivityScope::Client(client.id)).await?;
    if !tx.delete_client(client.id).await? {
        return Err(WalkError::Vanished {
            kind: "Client",
            id: client.id,
        });
    }

    debug!(
        client_id = %client.id,
        task_lists = client.task_list_ids.len(),
        activities,
        files = plan.file_count(),
        "Walked client"
    );
    Ok(())
}

async fn walk_task_list(
    tx: &mut dyn StoreTransaction,
    plan: &mut DeletionPlan,
    task_list_id: Uuid,
    owner_id: Uuid,
) -> Result<(), WalkError> {
    let list = tx
        .find_task_list(task_list_id)
        .await?
        .ok_or(WalkError::NotFound("Task list not found"))?;

    if list.client_id != owner_id {
        return Err(WalkError::Mismatch(format!(
            "task list {} is not owned by client {}",
            list.id, owner_id
        )));
    }

    // Lock parent before child, the same order as the client walk
    let owner = tx
        .find_client_for_update(owner_id)
        .await?
        .ok_or(WalkError::Dangling {
            kind: "Client",
            id: owner_id,
        })?;

    let list = tx
        .find_task_list_for_update(list.id)
        .await?
        .ok_or(WalkError::Vanished {
            kind: "Task list",
            id: list.id,
        })?;

    for task_id in &list.task_ids {
        purge_task(tx, plan, *task_id).await?;
    }

    tx.pull_task_list(owner.id, list.id).await?;
    let activities = tx.delete_activities(ActivityScope::TaskList(list.id)).await?;

    if !tx.delete_task_list(list.id).await? {
        return Err(WalkError::Vanished {
            kind: "Task list",
            id: list.id,
        });
    }

    debug!(
        task_list_id = %list.id,
        tasks = list.task_ids.len(),
        activities,
        files = plan.file_count(),
        "Walked task list"
    );
    Ok(())
}

async fn walk_task(
    tx: &mut dyn StoreTransaction,
    plan: &mut DeletionPlan,
    task_id: Uuid,
    task_list_id: Uuid,
) -> Result<(), WalkError> {
    let task = tx
        .find_task(task_id)
        .await?
        .ok_or(WalkError::NotFound("Task not found"))?;

    if task.task_list_id != task_list_id {
        return Err(WalkError::Mismatch(format!(
            "task {} is not in task list {}",
            task.id, task_list_id
        )));
    }

    if tx.find_task_list_for_update(task_list_id).await?.is_none() {
        return Err(WalkError::Dangling {
            kind: "Task list",
            id: task_list_id,
        });
    }

    // Re-read under the lock; comments committed meanwhile are included
    let task = tx
        .find_task_for_update(task.id)
        .await?
        .ok_or(WalkError::Vanished {
            kind: "Task",
            id: task.id,
        })?;

    plan.purge_task_files(tx, &task).await?;
    tx.pull_task(task_list_id, task.id).await?;
    let activities = tx.delete_activities(ActivityScope::Task(task.id)).await?;

    if !tx.delete_task(task.id).await? {
        return Err(WalkError::Vanished {
            kind: "Task",
            id: task.id,
        });
    }

    debug!(
        task_id = %task.id,
        comments = task.comments.len(),
        activities,
        files = plan.file_count(),
        "Walked task"
    );
    Ok(())
}

async fn walk_file(
    tx: &mut dyn StoreTransaction,
    plan: &mut DeletionPlan,
    file_id: Uuid,
    task_id: Uuid,
) -> Result<(), WalkError> {
    let file = tx
        .find_file(file_id)
        .await?
        .ok_or(WalkError::NotFound("File not found"))?;

    let task = tx
        .find_task_for_update(task_id)
        .await?
        .ok_or(WalkError::Dangling {
            kind: "Task",
            id: task_id,
        })?;

    if !task.references_file(file.id) {
        return Err(WalkError::Mismatch(format!(
            "task {} does not reference file {}",
            task.id, file.id
        )));
    }

    tx.pull_file(task.id, file.id).await?;
    if !tx.delete_file(file.id).await? {
        return Err(WalkError::Vanished {
            kind: "File",
            id: file.id,
        });
    }
    plan.queue_path(file.id, file.path);

    debug!(file_id = %file_id, task_id = %task_id, "Walked file");
    Ok(())
}

async fn walk_comment(
    tx: &mut dyn StoreTransaction,
    plan: &mut DeletionPlan,
    task_id: Uuid,
    comment_id: Uuid,
) -> Result<(), WalkError> {
    let task = tx
        .find_task_for_update(task_id)
        .await?
        .ok_or(WalkError::NotFound("Task not found"))?;

    let comment = task
        .comment(comment_id)
        .ok_or(WalkError::NotFound("Comment not found"))?;

    for file_id in &comment.file_ids {
        plan.purge_file(tx, *file_id).await?;
    }

    let activities = tx.delete_activities(ActivityScope::Comment(comment.id)).await?;

    if !tx.pull_comment(task.id, comment.id).await? {
        return Err(WalkError::Vanished {
            kind: "Comment",
            id: comment.id,
        });
    }

    debug!(
        task_id = %task.id,
        comment_id = %comment.id,
        activities,
        files = plan.file_count(),
        "Walked comment"
    );
    Ok(())
}

/// Deletes one task of a list being removed, files first
async fn purge_task(
    tx: &mut dyn StoreTransaction,
    plan: &mut DeletionPlan,
    task_id: Uuid,
) -> Result<(), WalkError> {
    let task: Task = tx
        .find_task_for_update(task_id)
        .await?
        .ok_or(WalkError::Dangling {
            kind: "Task",
            id: task_id,
        })?;

    plan.purge_task_files(tx, &task).await?;

    if !tx.delete_task(task.id).await? {
        return Err(WalkError::Vanished {
            kind: "Task",
            id: task.id,
        });
    }
    Ok(())
}
