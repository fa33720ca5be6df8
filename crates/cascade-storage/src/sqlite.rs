//! SQLite-backed [`Storage`] implementation.
//!
//! Schema is the external contract described in spec §6: one table
//! `messages(stream_name, cascade_id, payload, metadata, created_at)` with
//! primary key `(stream_name, cascade_id)`. `payload` and `metadata` are
//! JSON text; `created_at` is an ISO8601 string (SQLite has no native
//! timestamp type, the convention the orchestrator crate's models follow).

use async_trait::async_trait;
use cascade_core::Message;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tokio::sync::Mutex;

use crate::error::{Result, StorageError};
use crate::traits::Storage;

#[derive(FromRow)]
struct MessageRow {
    cascade_id: String,
    payload: String,
    metadata: String,
    created_at: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        Ok(Message {
            cascade_id: self.cascade_id,
            payload: serde_json::from_str(&self.payload)?,
            metadata: serde_json::from_str::<Value>(&self.metadata)?
                .as_object()
                .cloned()
                .unwrap_or_else(Map::new),
            created_at: self
                .created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

/// SQLite storage backend. The database file is named after the project
/// (`<project>.db`), per spec §6.
///
/// `sqlx`'s pool gives us up to 5 concurrent reader connections, but SQLite
/// only ever allows one writer at a time; under `parallel > 1` transforms
/// (spec §4.5) two pooled connections racing a check-then-insert would
/// surface that contention as `SQLITE_BUSY` instead of the documented
/// `AlreadyExists`. `write_lock` serialises every `store()` call onto a
/// single in-process writer (spec §5: "must serialise writes, a single
/// writer mutex is sufficient"), and WAL mode plus a busy timeout absorb
/// whatever contention still reaches SQLite itself (e.g. from another
/// process).
pub struct SqliteStorage {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteStorage {
    /// Open (creating if absent) the database at `database_url`, e.g.
    /// `sqlite:demo.db` or `sqlite::memory:`, and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            StorageError::Backend(sqlx::Error::Migrate(Box::new(e)))
        })?;
        Ok(Self { pool, write_lock: Mutex::new(()) })
    }

    /// Open the database named after `project_name` (`<project_name>.db`),
    /// creating it if it does not already exist.
    pub async fn for_project(project_name: &str) -> Result<Self> {
        let url = format!("sqlite:{project_name}.db?mode=rwc");
        Self::connect(&url).await
    }

    /// Open an existing database without running migrations. For read-only
    /// callers (the `cascade unroll` CLI subcommand, spec §6's "explorer"
    /// contract) that must not attempt to write a migrations-tracking table
    /// to a `mode=ro` connection. `journal_mode=WAL` is a write and would
    /// fail against `mode=ro`, so it is skipped here; `busy_timeout` is
    /// harmless to set on a read-only connection and still absorbs
    /// contention against a concurrent writer.
    pub async fn open_existing(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;
        Ok(Self { pool, write_lock: Mutex::new(()) })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn exists(&self, stream: &str, cascade_id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM messages WHERE stream_name = ? AND cascade_id = ?")
                .bind(stream)
                .bind(cascade_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn store(&self, stream: &str, message: &Message) -> Result<()> {
        // Hold the writer lock across the check and the insert so two
        // concurrent callers can never both observe "not present" and race
        // to insert the same (stream, cascade_id) pair.
        let _guard = self.write_lock.lock().await;

        if self.exists(stream, &message.cascade_id).await? {
            return Err(StorageError::AlreadyExists {
                stream: stream.to_string(),
                cascade_id: message.cascade_id.clone(),
            });
        }
        let payload = serde_json::to_string(&message.payload)?;
        let metadata = serde_json::to_string(&message.metadata)?;
        let created_at = message.created_at.to_rfc3339();

        sqlx::query(
            "INSERT INTO messages (stream_name, cascade_id, payload, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(stream)
        .bind(&message.cascade_id)
        .bind(payload)
        .bind(metadata)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(stream, cascade_id = %message.cascade_id, "persisted message");
        Ok(())
    }

    async fn get(&self, cascade_id: &str) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT cascade_id, payload, metadata, created_at FROM messages WHERE cascade_id = ? LIMIT 1",
        )
        .bind(cascade_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MessageRow::into_message).transpose()
    }

    async fn list_messages(&self, stream: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT cascade_id, payload, metadata, created_at FROM messages \
             WHERE stream_name = ? ORDER BY created_at ASC",
        )
        .bind(stream)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    async fn list_streams(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT stream_name FROM messages")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
