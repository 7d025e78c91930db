/// Client model and database operations
///
/// A client is any account: accounting staff (`admin`) or their customers
/// (`client`). Every client owns an ordered list of task list ids.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE client_role AS ENUM ('admin', 'client');
///
/// CREATE TABLE clients (
///     id UUID PRIMARY KEY,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     first_name VARCHAR(100) NOT NULL DEFAULT '',
///     last_name VARCHAR(100) NOT NULL DEFAULT '',
///     business_name VARCHAR(200) NOT NULL DEFAULT '',
///     role client_role NOT NULL DEFAULT 'client',
///     task_list_ids UUID[] NOT NULL DEFAULT '{}',
///     invitation_accepted BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "client_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// Accounting staff
    Admin,

    /// Customer of the accounting service
    #[default]
    Client,
}

impl ClientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientRole::Admin => "admin",
            ClientRole::Client => "client",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Client account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    /// Unique client ID
    pub id: Uuid,

    /// Login email, unique across all clients
    pub email: String,

    /// Password hash produced by the authentication layer
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    pub business_name: String,

    pub role: ClientRole,

    /// Owned task lists, in creation order
    pub task_list_ids: Vec<Uuid>,

    /// Whether the client has accepted the account invitation
    pub invitation_accepted: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Builds a new client record with a fresh id and no task lists
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>, role: ClientRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            first_name: String::new(),
            last_name: String::new(),
            business_name: String::new(),
            role,
            task_list_ids: Vec::new(),
            invitation_accepted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name used in notifications: the first name, or the email when unset
    pub fn display_name(&self) -> &str {
        if self.first_name.is_empty() {
            &self.email
        } else {
            &self.first_name
        }
    }

    /// Inserts the client row
    ///
    /// # Errors
    ///
    /// Fails on a duplicate email (unique constraint) or connection error.
    pub async fn insert(conn: &mut PgConnection, client: &Client) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO clients (id, email, password_hash, first_name, last_name, business_name,
                                 role, task_list_ids, invitation_accepted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(client.id)
        .bind(&client.email)
        .bind(&client.password_hash)
        .bind(&client.first_name)
        .bind(&client.last_name)
        .bind(&client.business_name)
        .bind(client.role)
        .bind(&client.task_list_ids)
        .bind(client.invitation_accepted)
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Finds a client by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Client>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, business_name,
                   role, task_list_ids, invitation_accepted, created_at, updated_at
            FROM clients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Finds a client by ID and locks its row until the transaction ends
    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Client>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, business_name,
                   role, task_list_ids, invitation_accepted, created_at, updated_at
            FROM clients
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Finds a client by email (exact match)
    pub async fn find_by_email(
        conn: &mut PgConnection,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Client>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, business_name,
                   role, task_list_ids, invitation_accepted, created_at, updated_at
            FROM clients
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Lists every account, oldest first
    pub async fn list_all(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Client>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, business_name,
                   role, task_list_ids, invitation_accepted, created_at, updated_at
            FROM clients
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&mut *conn)
        .await
    }

    pub async fn set_role(
        conn: &mut PgConnection,
        id: Uuid,
        role: ClientRole,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE clients SET role = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(role)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Appends a task list id to the client's `task_list_ids`
    ///
    /// Returns false when the client does not exist.
    pub async fn push_task_list(
        conn: &mut PgConnection,
        id: Uuid,
        task_list_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET task_list_ids = array_append(task_list_ids, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(task_list_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a task list id from the client's `task_list_ids`
    ///
    /// Returns false when the client does not exist.
    pub async fn pull_task_list(
        conn: &mut PgConnection,
        id: Uuid,
        task_list_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET task_list_ids = array_remove(task_list_ids, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(task_list_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the client row
    ///
    /// Fails with a foreign key violation while task lists still point at it.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
