/// Task list model and database operations
///
/// A task list groups the tasks an admin prepared for one client (for example
/// "Taxes 2024"). Names are unique per client.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE task_lists (
///     id UUID PRIMARY KEY,
///     client_id UUID NOT NULL REFERENCES clients(id),
///     name VARCHAR(100) NOT NULL,
///     task_ids UUID[] NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (client_id, name)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

/// Task list owned by a single client
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskList {
    pub id: Uuid,

    /// Owning client
    pub client_id: Uuid,

    pub name: String,

    /// Tasks in this list, in creation order
    pub task_ids: Vec<Uuid>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl TaskList {
    /// Builds a new, empty task list for `client_id`
    pub fn new(client_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id,
            name: name.into(),
            task_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn insert(conn: &mut PgConnection, list: &TaskList) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO task_lists (id, client_id, name, task_ids, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(list.id)
        .bind(list.client_id)
        .bind(&list.name)
        .bind(&list.task_ids)
        .bind(list.created_at)
        .bind(list.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskList>(
            r#"
            SELECT id, client_id, name, task_ids, created_at, updated_at
            FROM task_lists
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Same as [`TaskList::find_by_id`] but holds a row lock until the
    /// transaction ends
    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskList>(
            r#"
            SELECT id, client_id, name, task_ids, created_at, updated_at
            FROM task_lists
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Finds the client's task list with the given name
    pub async fn find_by_name(
        conn: &mut PgConnection,
        client_id: Uuid,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskList>(
            r#"
            SELECT id, client_id, name, task_ids, created_at, updated_at
            FROM task_lists
            WHERE client_id = $1 AND name = $2
            "#,
        )
        .bind(client_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Renames the list; the `(client_id, name)` unique index rejects duplicates
    pub async fn rename(conn: &mut PgConnection, id: Uuid, name: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE task_lists SET name = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(name)
                .execute(&mut *conn)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Appends a task id to `task_ids`
    pub async fn push_task(
        conn: &mut PgConnection,
        id: Uuid,
        task_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE task_lists
            SET task_ids = array_append(task_ids, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(task_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a task id from `task_ids`
    pub async fn pull_task(
        conn: &mut PgConnection,
        id: Uuid,
        task_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE task_lists
            SET task_ids = array_remove(task_ids, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(task_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the task list row
    ///
    /// Fails with a foreign key violation while tasks still point at it.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_lists WHERE id = $1")
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
    fn test_new_task_list_is_empty() {
        let client_id = Uuid::new_v4();
        let list = TaskList::new(client_id, "Taxes 2024");

        assert_eq!(list.client_id, client_id);
        assert_eq!(list.name, "Taxes 2024");
        assert!(list.task_ids.is_empty());
    }
}
