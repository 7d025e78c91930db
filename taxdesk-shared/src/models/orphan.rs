/// Orphaned-file queue
///
/// When a post-commit unlink fails the path is recorded here so the worker
/// can retry it later. Entries are written outside any transaction: by the
/// time a path lands here the records pointing at it are already gone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrphanedFile {
    pub id: Uuid,

    pub path: String,

    /// Failed removal attempts so far (the initial post-commit unlink counts)
    pub attempts: i32,

    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl OrphanedFile {
    /// Queues a path after a failed unlink
    pub async fn record(pool: &PgPool, path: &str, error: &str) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO orphaned_files (path, attempts, last_error, last_attempt_at)
            VALUES ($1, 1, $2, NOW())
            RETURNING id
            "#,
        )
        .bind(path)
        .bind(error)
        .fetch_one(pool)
        .await
    }

    /// Oldest queued entries first
    pub async fn list_pending(pool: &PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, OrphanedFile>(
            r#"
            SELECT id, path, attempts, last_error, created_at, last_attempt_at
            FROM orphaned_files
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Drops an entry once its path is gone
    pub async fn resolve(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM orphaned_files WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn record_failure(pool: &PgPool, id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE orphaned_files
            SET attempts = attempts + 1, last_error = $2, last_attempt_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
