/// Task model and database operations
///
/// A task is a unit of work an admin assigns to a client inside a task list,
/// usually "upload document X". Tasks carry their own files and an embedded
/// comment thread (see [`Comment`]).
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('waiting for client', 'needs review', 'completed');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY,
///     client_id UUID NOT NULL REFERENCES clients(id),
///     task_list_id UUID NOT NULL REFERENCES task_lists(id),
///     title VARCHAR(200) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     status task_status NOT NULL DEFAULT 'waiting for client',
///     file_ids UUID[] NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::fmt;
use uuid::Uuid;

use super::comment::Comment;

/// Task workflow status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status")]
pub enum TaskStatus {
    /// The client still has to act (initial state)
    #[default]
    #[sqlx(rename = "waiting for client")]
    #[serde(rename = "waiting for client")]
    WaitingForClient,

    /// The client answered and staff should review
    #[sqlx(rename = "needs review")]
    #[serde(rename = "needs review")]
    NeedsReview,

    #[sqlx(rename = "completed")]
    #[serde(rename = "completed")]
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::WaitingForClient => "waiting for client",
            TaskStatus::NeedsReview => "needs review",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task with its embedded comments
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,

    /// Client the task was created for
    pub client_id: Uuid,

    /// Task list containing the task
    pub task_list_id: Uuid,

    pub title: String,

    pub description: String,

    pub status: TaskStatus,

    /// Files attached directly to the task
    pub file_ids: Vec<Uuid>,

    /// Comment thread, oldest first
    #[sqlx(skip)]
    pub comments: Vec<Comment>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Builds a new task waiting for the client
    pub fn new(
        client_id: Uuid,
        task_list_id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
        file_ids: Vec<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id,
            task_list_id,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::default(),
            file_ids,
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Finds a comment of this task
    pub fn comment(&self, comment_id: Uuid) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }

    /// Whether the file is attached to the task or to one of its comments
    pub fn references_file(&self, file_id: Uuid) -> bool {
        self.file_ids.contains(&file_id)
            || self.comments.iter().any(|c| c.file_ids.contains(&file_id))
    }

    /// Every file id reachable from the task: comment files first, then the
    /// task's own files
    pub fn reachable_file_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.comments
            .iter()
            .flat_map(|c| c.file_ids.iter().copied())
            .chain(self.file_ids.iter().copied())
    }

    /// Inserts the task row and any comments it already carries
    pub async fn insert(conn: &mut PgConnection, task: &Task) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, client_id, task_list_id, title, description, status, file_ids,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(task.id)
        .bind(task.client_id)
        .bind(task.task_list_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status)
        .bind(&task.file_ids)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&mut *conn)
        .await?;

        for comment in &task.comments {
            Comment::insert(conn, comment).await?;
        }

        Ok(())
    }

    /// Finds a task by ID and loads its comments
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, client_id, task_list_id, title, description, status, file_ids,
                   created_at, updated_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match task {
            Some(mut task) => {
                task.comments = Comment::list_for_task(conn, task.id).await?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Locks the task row, then loads the task and its comments
    ///
    /// The comment query runs after the lock is granted, so it sees every
    /// comment committed by a writer that held the row before us. Writers
    /// that add comments touch the task row first (see `push_comment` in the
    /// PostgreSQL store) and therefore wait for this transaction.
    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, client_id, task_list_id, title, description, status, file_ids,
                   created_at, updated_at
            FROM tasks
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match task {
            Some(mut task) => {
                task.comments = Comment::list_for_task(conn, task.id).await?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Finds the task with the given title inside a task list
    pub async fn find_in_list_by_title(
        conn: &mut PgConnection,
        task_list_id: Uuid,
        title: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM tasks WHERE task_list_id = $1 AND title = $2 ORDER BY created_at LIMIT 1",
        )
        .bind(task_list_id)
        .bind(title)
        .fetch_optional(&mut *conn)
        .await?;

        match id {
            Some(id) => Self::find_by_id(conn, id).await,
            None => Ok(None),
        }
    }

    /// Appends files to the task's `file_ids`
    pub async fn push_files(
        conn: &mut PgConnection,
        id: Uuid,
        file_ids: &[Uuid],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET file_ids = file_ids || $2::uuid[], updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(file_ids.to_vec())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a file id from the task's `file_ids`
    pub async fn pull_file(
        conn: &mut PgConnection,
        id: Uuid,
        file_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET file_ids = array_remove(file_ids, $2), updated_at = NOW()
            WHERE id = $1 AND $2 = ANY(file_ids)
            "#,
        )
        .bind(id)
        .bind(file_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bumps `updated_at`; returns false when the task does not exist
    pub async fn touch(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tasks SET updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tasks SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_description(
        conn: &mut PgConnection,
        id: Uuid,
        description: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE tasks SET description = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(description)
                .execute(&mut *conn)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces title and description
    pub async fn set_details(
        conn: &mut PgConnection,
        id: Uuid,
        title: &str,
        description: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET title = $2, description = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the task together with its embedded comments
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        Comment::delete_for_task(conn, id).await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_with_spaces() {
        assert_eq!(
            serde_json::to_value(TaskStatus::WaitingForClient).unwrap(),
            "waiting for client"
        );
        assert_eq!(
            serde_json::from_str::<TaskStatus>("\"needs review\"").unwrap(),
            TaskStatus::NeedsReview
        );
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_reachable_files_lists_comment_files_first() {
        let (f1, f2, f3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut task = Task::new(Uuid::new_v4(), Uuid::new_v4(), "W2 Form", "", vec![f1, f2]);
        task.comments
            .push(Comment::new(task.id, task.client_id, "attached", vec![f3]));

        let files: Vec<Uuid> = task.reachable_file_ids().collect();
        assert_eq!(files, vec![f3, f1, f2]);
        assert!(task.references_file(f3));
        assert!(!task.references_file(Uuid::new_v4()));
    }
}
