/// Records stored by TaxDesk and their PostgreSQL queries
///
/// # Models
///
/// - `client`: Client accounts (admins and clients) owning task lists
/// - `task_list`: Named task lists owned by one client
/// - `task`: Tasks inside a task list, with status and attached files
/// - `comment`: Comments embedded in a task
/// - `file`: Uploaded file metadata (the bytes live on disk)
/// - `activity`: Audit rows written when a client comments
/// - `orphan`: Disk paths whose post-commit unlink failed
///
/// Query functions take `&mut PgConnection` so they run on whichever
/// transaction the caller holds. The orphan queue is the exception: it is
/// written after commit and takes the pool directly.
///
/// # Example
///
/// ```no_run
/// use taxdesk_shared::models::client::Client;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, id: Uuid) -> Result<(), sqlx::Error> {
/// let mut tx = pool.begin().await?;
/// if let Some(client) = Client::find_by_id(&mut tx, id).await? {
///     println!("{} owns {} task lists", client.email, client.task_list_ids.len());
/// }
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

pub mod activity;
pub mod client;
pub mod comment;
pub mod file;
pub mod orphan;
pub mod task;
pub mod task_list;
