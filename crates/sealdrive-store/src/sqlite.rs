//! SQLite implementation of the KvStore trait.
//!
//! This is the primary storage backend. A single `kv` table holds all
//! namespaced records; the connection sits behind a mutex. The calling
//! services already serialize mutations per file, so contention here is
//! short-lived point operations.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;
use crate::migration;
use crate::traits::KvStore;

/// Durable SQLite-backed store.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path.as_ref())?;
        migration::migrate(&mut conn)?;
        info!(path = %path.as_ref().display(), "opened sqlite store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();

        // A range scan over the primary key is exact and uses the index;
        // LIKE would need wildcard escaping for arbitrary key strings.
        let mut keys = Vec::new();
        match prefix_upper_bound(prefix) {
            Some(upper) => {
                let mut stmt =
                    conn.prepare("SELECT key FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key")?;
                let rows = stmt.query_map(params![prefix, upper], |row| row.get::<_, String>(0))?;
                for row in rows {
                    keys.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare("SELECT key FROM kv WHERE key >= ?1 ORDER BY key")?;
                let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
                for row in rows {
                    let key: String = row?;
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        Ok(keys)
    }
}

/// Smallest string strictly greater than every string with this prefix.
///
/// Returns None when no such string exists (empty prefix or all-0xff tail).
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(&last) = bytes.last() {
        if last < 0x7f {
            *bytes.last_mut().unwrap() = last + 1;
            return String::from_utf8(bytes).ok();
        }
        bytes.pop();
    }
    None
}
