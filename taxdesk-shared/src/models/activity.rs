/// Activity (audit) records
///
/// An activity row is written whenever a client comments on a task. Rows are
/// denormalized: they copy the client, task list, task and comment ids instead
/// of pointing at them through foreign keys, and are removed explicitly when
/// any of those is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub client_id: Uuid,
    pub task_id: Uuid,
    pub task_list_id: Uuid,
    pub comment_id: Option<Uuid>,
    pub message: String,
    pub file_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        client_id: Uuid,
        task_list_id: Uuid,
        task_id: Uuid,
        comment_id: Option<Uuid>,
        message: impl Into<String>,
        file_ids: Vec<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            task_id,
            task_list_id,
            comment_id,
            message: message.into(),
            file_ids,
            created_at: Utc::now(),
        }
    }

    pub async fn insert(conn: &mut PgConnection, activity: &Activity) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, client_id, task_id, task_list_id, comment_id, message,
                                    file_ids, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(activity.id)
        .bind(activity.client_id)
        .bind(activity.task_id)
        .bind(activity.task_list_id)
        .bind(activity.comment_id)
        .bind(&activity.message)
        .bind(&activity.file_ids)
        .bind(activity.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Lists the activity rows matching a scope, oldest first
    pub async fn list_scoped(
        conn: &mut PgConnection,
        scope: ActivityScope,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT id, client_id, task_id, task_list_id, comment_id, message, file_ids, created_at
            FROM activities
            WHERE {} = $1
            ORDER BY created_at ASC
            "#,
            scope.column()
        );

        sqlx::query_as::<_, Activity>(&sql)
            .bind(scope.id())
            .fetch_all(&mut *conn)
            .await
    }

    /// Deletes every activity row matching a scope
    pub async fn delete_scoped(
        conn: &mut PgConnection,
        scope: ActivityScope,
    ) -> Result<u64, sqlx::Error> {
        let sql = format!("DELETE FROM activities WHERE {} = $1", scope.column());

        let result = sqlx::query(&sql)
            .bind(scope.id())
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Removes a file id from every activity row that lists it
    pub async fn pull_file(conn: &mut PgConnection, file_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE activities
            SET file_ids = array_remove(file_ids, $1)
            WHERE $1 = ANY(file_ids)
            "#,
        )
        .bind(file_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

/// The entity an activity row is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityScope {
    Client(Uuid),
    TaskList(Uuid),
    Task(Uuid),
    Comment(Uuid),
}

impl ActivityScope {
    pub fn id(&self) -> Uuid {
        match *self {
            ActivityScope::Client(id)
            | ActivityScope::TaskList(id)
            | ActivityScope::Task(id)
            | ActivityScope::Comment(id) => id,
        }
    }

    /// Column holding the scoped id; never user input
    fn column(&self) -> &'static str {
        match self {
            ActivityScope::Client(_) => "client_id",
            ActivityScope::TaskList(_) => "task_list_id",
            ActivityScope::Task(_) => "task_id",
            ActivityScope::Comment(_) => "comment_id",
        }
    }

    pub fn matches(&self, activity: &Activity) -> bool {
        match *self {
            ActivityScope::Client(id) => activity.client_id == id,
            ActivityScope::TaskList(id) => activity.task_list_id == id,
            ActivityScope::Task(id) => activity.task_id == id,
            ActivityScope::Comment(id) => activity.comment_id == Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_matches_only_its_column() {
        let (client, list, task, comment) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let activity = Activity::new(client, list, task, Some(comment), "new comment", vec![]);

        assert!(ActivityScope::Client(client).matches(&activity));
        assert!(ActivityScope::TaskList(list).matches(&activity));
        assert!(ActivityScope::Task(task).matches(&activity));
        assert!(ActivityScope::Comment(comment).matches(&activity));
        assert!(!ActivityScope::Task(client).matches(&activity));
    }

    #[test]
    fn test_comment_scope_skips_rows_without_comment() {
        let comment = Uuid::new_v4();
        let activity = Activity::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), None, "", vec![]);

        assert!(!ActivityScope::Comment(comment).matches(&activity));
        assert_eq!(ActivityScope::Comment(comment).id(), comment);
    }
}
