pub mod error;
pub mod events;
pub mod members;
pub mod migrations;
pub mod models;
pub mod rooms;
pub mod sessions;
pub mod users;

pub use error::{DbError, Result};

use chatter_types::Id;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

const READER_POOL_SIZE: usize = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite store with a single writer and a small pool of read-only readers.
///
/// Every write, and every event ID, is produced while holding the writer lock,
/// so a row is committed before any ID generated after it exists.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Run `f` on a reader connection.
    pub fn with_conn<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<DbError>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx].lock().map_err(|_| DbError::Poisoned)?;
        f(&conn)
    }

    /// Run `f` on the writer connection.
    pub fn with_conn_mut<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<DbError>,
    {
        let conn = self.writer.lock().map_err(|_| DbError::Poisoned)?;
        f(&conn)
    }

    /// Boundary ID for "now", taken under the writer lock so that no write
    /// holding an earlier ID is still in flight.
    pub fn watermark(&self) -> Result<Id> {
        self.with_conn_mut(|_| Ok(Id::watermark()))
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;

    #[test]
    fn reopen_keeps_data() {
        let (dir, db) = temp_db();
        let alice = user(&db, "alice");
        drop(db);

        let db = super::Database::open(&dir.path().join("test.db")).unwrap();
        let found = db.get_user_by_id(alice.id).unwrap().unwrap();
        assert_eq!(found.username, "alice");
    }

    #[test]
    fn watermark_is_boundary() {
        let (_dir, db) = temp_db();
        assert!(db.watermark().unwrap().is_boundary());
    }
}
