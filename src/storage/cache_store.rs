//! SQLite-backed durable lookup cache

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, warn};

use crate::catalog::cache::{CacheEntry, DurableCache};
use crate::catalog::Card;
use crate::error::CacheError;

/// Cache entries stored as JSON in a single table
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open or create the cache database at `path`
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            debug!("Failed to enable WAL mode: {}", e);
        }
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open the store, logging and returning `None` on failure
    pub fn open_or_warn(path: &Path) -> Option<Self> {
        match Self::open(path) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(
                    "Durable cache unavailable at {}: {}, using in-process cache only",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS lookup_cache (
                key          TEXT PRIMARY KEY,
                data         TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM lookup_cache", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

impl DurableCache for SqliteCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row: Option<(String, i64)> = self
            .conn
            .lock()
            .query_row(
                "SELECT data, timestamp_ms FROM lookup_cache WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((data, timestamp_ms)) = row else {
            return Ok(None);
        };

        let card: Card = serde_json::from_str(&data)?;
        Ok(Some(CacheEntry {
            key: key.to_string(),
            data: card,
            timestamp_ms: timestamp_ms.max(0) as u64,
        }))
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let data = serde_json::to_string(&entry.data)?;
        self.conn.lock().execute(
            "INSERT INTO lookup_cache (key, data, timestamp_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data, timestamp_ms = excluded.timestamp_ms",
            params![entry.key, data, entry.timestamp_ms as i64],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.conn
            .lock()
            .execute("DELETE FROM lookup_cache WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.conn.lock().execute("DELETE FROM lookup_cache", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::cache::tests::card;
    use tempfile::tempdir;

    fn entry(key: &str, name: &str, timestamp_ms: u64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            data: card(name),
            timestamp_ms,
        }
    }

    #[test]
    fn test_put_get_remove() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        assert!(store.get("exact:shock").unwrap().is_none());

        store.put(&entry("exact:shock", "Shock", 42)).unwrap();
        let loaded = store.get("exact:shock").unwrap().unwrap();
        assert_eq!(loaded, entry("exact:shock", "Shock", 42));

        store.remove("exact:shock").unwrap();
        assert!(store.get("exact:shock").unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store.put(&entry("fuzzy:bolt", "Lightning Bolt", 1)).unwrap();
        store.put(&entry("fuzzy:bolt", "Lightning Bolt", 2)).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("fuzzy:bolt").unwrap().unwrap().timestamp_ms, 2);
    }

    #[test]
    fn test_clear() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store.put(&entry("exact:a", "Alpha", 1)).unwrap();
        store.put(&entry("exact:b", "Bravo", 1)).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        {
            let store = SqliteCacheStore::open(&path).unwrap();
            store.put(&entry("id:abc", "Shock", 7)).unwrap();
        }

        let store = SqliteCacheStore::open(&path).unwrap();
        assert_eq!(store.get("id:abc").unwrap().unwrap().data.name, "Shock");
    }

    #[test]
    fn test_open_failure_degrades() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as a database file
        assert!(SqliteCacheStore::open_or_warn(dir.path()).is_none());
    }
}
