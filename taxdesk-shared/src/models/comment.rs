/// Task comments
///
/// Comments are embedded in their task: they are loaded with it, listed in
/// insertion order and removed together with it. Each comment may carry its
/// own uploaded files.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE task_comments (
///     seq BIGSERIAL,
///     id UUID PRIMARY KEY,
///     task_id UUID NOT NULL REFERENCES tasks(id),
///     author_id UUID NOT NULL,
///     body TEXT NOT NULL,
///     is_system BOOLEAN NOT NULL DEFAULT FALSE,
///     file_ids UUID[] NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

/// Comment embedded in a task
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,

    /// Task the comment belongs to
    pub task_id: Uuid,

    /// Client or admin who wrote it
    pub author_id: Uuid,

    pub body: String,

    /// True for comments written by the system (status changes, reminders)
    pub is_system: bool,

    /// Files attached to this comment
    pub file_ids: Vec<Uuid>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Comment {
    /// Builds a user comment
    pub fn new(task_id: Uuid, author_id: Uuid, body: impl Into<String>, file_ids: Vec<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            author_id,
            body: body.into(),
            is_system: false,
            file_ids,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds a system comment without attachments
    pub fn system(task_id: Uuid, author_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            is_system: true,
            ..Self::new(task_id, author_id, body, Vec::new())
        }
    }

    pub async fn insert(conn: &mut PgConnection, comment: &Comment) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO task_comments (id, task_id, author_id, body, is_system, file_ids,
                                       created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(comment.id)
        .bind(comment.task_id)
        .bind(comment.author_id)
        .bind(&comment.body)
        .bind(comment.is_system)
        .bind(&comment.file_ids)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Lists a task's comments in insertion order
    pub async fn list_for_task(
        conn: &mut PgConnection,
        task_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, task_id, author_id, body, is_system, file_ids, created_at, updated_at
            FROM task_comments
            WHERE task_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(&mut *conn)
        .await
    }

    /// Removes a file id from every comment of the task
    pub async fn pull_file(
        conn: &mut PgConnection,
        task_id: Uuid,
        file_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE task_comments
            SET file_ids = array_remove(file_ids, $2), updated_at = NOW()
            WHERE task_id = $1 AND $2 = ANY(file_ids)
            "#,
        )
        .bind(task_id)
        .bind(file_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Replaces the body of one comment of a task
    pub async fn set_body(
        conn: &mut PgConnection,
        task_id: Uuid,
        comment_id: Uuid,
        body: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE task_comments
            SET body = $3, updated_at = NOW()
            WHERE task_id = $1 AND id = $2
            "#,
        )
        .bind(task_id)
        .bind(comment_id)
        .bind(body)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes one comment of a task
    pub async fn delete(
        conn: &mut PgConnection,
        task_id: Uuid,
        comment_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_comments WHERE task_id = $1 AND id = $2")
            .bind(task_id)
            .bind(comment_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every comment of a task
    pub async fn delete_for_task(conn: &mut PgConnection, task_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_comments WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_comment_has_no_files() {
        let comment = Comment::system(Uuid::new_v4(), Uuid::new_v4(), "status changed");

        assert!(comment.is_system);
        assert!(comment.file_ids.is_empty());
    }
}
