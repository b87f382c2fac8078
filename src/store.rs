use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

/// Durable Telegram-id → Zulip-id mapping.
///
/// This is the only state that outlives a process: an edit may arrive any
/// time up to the edit window after the original send, possibly after a
/// restart. One table, keyed by the Telegram message id.
#[derive(Clone)]
pub struct MappingStore {
    conn: Arc<Mutex<Connection>>,
}

impl MappingStore {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // WAL mode for better concurrent read performance.
        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("Mapping store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                tid INTEGER PRIMARY KEY,
                zid INTEGER
            );",
        )
        .context("Failed to create messages table")?;
        Ok(())
    }

    /// Record a (telegram_id, zulip_id) pair. Idempotent: if the telegram
    /// id is already mapped, the existing row wins and this is a no-op.
    pub async fn insert(&self, telegram_id: i64, zulip_id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO messages (tid, zid) VALUES (?1, ?2)",
            rusqlite::params![telegram_id, zulip_id],
        )
        .context("Failed to insert id mapping")?;
        Ok(())
    }

    /// Find the Zulip id a Telegram message was forwarded as, if any.
    pub async fn lookup(&self, telegram_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT zid FROM messages WHERE tid = ?1",
            rusqlite::params![telegram_id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })
        .context("Failed to look up id mapping")
    }
}
