use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::warn;

use crate::api::types::SearchResponse;

/// Bumped whenever the stored [`SearchResponse`] shape changes incompatibly.
/// Reads match only the current version, so stale rows behave as absent
/// instead of being attempted-parsed.
pub const SCHEMA_VERSION: i64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("cache encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable per-conversation "last comparison shown" store, independent of the
/// server-owned message history. Switching conversations restores the last
/// artifact without re-querying.
pub struct ResponseCache {
    conn: Mutex<Connection>,
}

impl ResponseCache {
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir).ok();
        let conn = Connection::open(dir.join("response-cache.db"))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.migrate()?;
        Ok(cache)
    }

    fn migrate(&self) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS cached_responses (
                conversation_id INTEGER NOT NULL,
                schema_version INTEGER NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (conversation_id, schema_version)
            );
            ",
        )?;
        Ok(())
    }

    /// Last artifact shown for the conversation, or `None`. Malformed stored
    /// data is deleted and reported as absent; a parse failure never reaches
    /// the caller.
    pub fn get(&self, conversation_id: i64) -> Option<SearchResponse> {
        let conn = self.conn.lock().unwrap();
        let payload: String = match conn.query_row(
            "SELECT payload FROM cached_responses
             WHERE conversation_id = ?1 AND schema_version = ?2",
            params![conversation_id, SCHEMA_VERSION],
            |row| row.get(0),
        ) {
            Ok(payload) => payload,
            Err(rusqlite::Error::QueryReturnedNoRows) => return None,
            Err(e) => {
                warn!(conversation_id, error = %e, "cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(conversation_id, error = %e, "dropping malformed cache entry");
                let _ = conn.execute(
                    "DELETE FROM cached_responses
                     WHERE conversation_id = ?1 AND schema_version = ?2",
                    params![conversation_id, SCHEMA_VERSION],
                );
                None
            }
        }
    }

    /// Overwrites unconditionally. Rows stored under other schema versions
    /// for this conversation are dropped so at most one artifact survives.
    pub fn put(&self, conversation_id: i64, response: &SearchResponse) -> Result<(), CacheError> {
        let payload = serde_json::to_string(response)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM cached_responses
             WHERE conversation_id = ?1 AND schema_version != ?2",
            params![conversation_id, SCHEMA_VERSION],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO cached_responses
             (conversation_id, schema_version, payload, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))",
            params![conversation_id, SCHEMA_VERSION, payload],
        )?;
        Ok(())
    }

    /// Invoked exactly when the conversation itself is deleted.
    pub fn clear(&self, conversation_id: i64) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM cached_responses WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(())
    }
}
