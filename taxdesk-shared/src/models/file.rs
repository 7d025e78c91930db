/// Uploaded file metadata
///
/// The record only describes the upload; the bytes live on disk at `path`.
/// A file is referenced from exactly one task or comment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: Uuid,

    /// Name the file had on the uploader's machine
    pub original_name: String,

    /// Location of the stored bytes
    pub path: String,

    pub size_bytes: i64,

    pub content_type: String,

    pub description: String,

    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(
        original_name: impl Into<String>,
        path: impl Into<String>,
        size_bytes: i64,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_name: original_name.into(),
            path: path.into(),
            size_bytes,
            content_type: content_type.into(),
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn disk_path(&self) -> &Path {
        Path::new(&self.path)
    }

    pub async fn insert(conn: &mut PgConnection, file: &FileRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO files (id, original_name, path, size_bytes, content_type, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(file.id)
        .bind(&file.original_name)
        .bind(&file.path)
        .bind(file.size_bytes)
        .bind(&file.content_type)
        .bind(&file.description)
        .bind(file.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, original_name, path, size_bytes, content_type, description, created_at
            FROM files
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
