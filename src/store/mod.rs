//! Durable cursor and idempotency bookkeeping over SQLite
//!
//! Every operation commits synchronously before returning, so the only
//! double-post window is a crash between submit and `record_published`;
//! the publisher closes that by re-checking `target_id` before every submit.

mod migrations;

pub use migrations::SCHEMA_VERSION;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::error::{BridgeError, Result};
use migrations::run_migrations;

/// Cursor and cross-id mapping store
pub struct CursorStore {
    conn: Arc<Mutex<Connection>>,
}

impl CursorStore {
    /// Open or create the store at the given path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(db_path, flags)
            .map_err(|e| BridgeError::StoreUnavailable(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BridgeError::StoreUnavailable(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::configure_pragmas(&conn)?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Configure SQLite for durable-before-return commits
    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA busy_timeout=30000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;
        Ok(())
    }

    /// Last successfully processed source post id, if any cycle completed
    pub fn cursor(&self) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let last: Option<String> = conn.query_row(
            "SELECT last_source_id FROM cursor WHERE id = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(last)
    }

    /// Advance the cursor
    pub fn set_cursor(&self, source_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE cursor SET last_source_id = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = 0",
            params![source_id],
        )?;
        Ok(())
    }

    /// Resolve the target platform id a source post was republished as
    pub fn target_id(&self, source_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let target: Option<String> = conn
            .query_row(
                "SELECT target_id FROM idempotency WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(target)
    }

    /// Record a successful republication, write-once.
    ///
    /// Returns `DuplicateKey` if the source id is already recorded; callers
    /// treat that as "already published", not as a failure.
    pub fn record_published(&self, source_id: &str, target_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO idempotency (source_id, target_id) VALUES (?1, ?2)",
            params![source_id, target_id],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(BridgeError::DuplicateKey {
                    source_id: source_id.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of idempotency records (for diagnostics)
    pub fn published_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM idempotency", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl Clone for CursorStore {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_starts_empty() {
        let store = CursorStore::open_in_memory().unwrap();
        assert_eq!(store.cursor().unwrap(), None);
    }

    #[test]
    fn test_cursor_roundtrip() {
        let store = CursorStore::open_in_memory().unwrap();
        store.set_cursor("1690000000000000001").unwrap();
        assert_eq!(
            store.cursor().unwrap().as_deref(),
            Some("1690000000000000001")
        );

        store.set_cursor("1690000000000000002").unwrap();
        assert_eq!(
            store.cursor().unwrap().as_deref(),
            Some("1690000000000000002")
        );
    }

    #[test]
    fn test_record_and_lookup() {
        let store = CursorStore::open_in_memory().unwrap();
        assert_eq!(store.target_id("42").unwrap(), None);

        store.record_published("42", "109000001").unwrap();
        assert_eq!(store.target_id("42").unwrap().as_deref(), Some("109000001"));
        assert_eq!(store.published_count().unwrap(), 1);
    }

    #[test]
    fn test_record_is_write_once() {
        let store = CursorStore::open_in_memory().unwrap();
        store.record_published("42", "109000001").unwrap();

        let err = store.record_published("42", "109000002").unwrap_err();
        assert!(matches!(
            err,
            BridgeError::DuplicateKey { ref source_id } if source_id == "42"
        ));

        // Original mapping is untouched
        assert_eq!(store.target_id("42").unwrap().as_deref(), Some("109000001"));
    }
}
