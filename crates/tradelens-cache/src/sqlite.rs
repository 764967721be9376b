use chrono::Utc;
use rusqlite::Connection;
use tradelens_models::cache_schema::{CacheRow, CACHE_TABLE_DDL};

use crate::error::CacheError;

/// Persistent SQLite cache tier.
///
/// Opened read-write with WAL so several processes can share one cache file.
/// Every failure here is non-fatal to callers of [`crate::CacheStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the cache database and enable WAL.
    pub fn open(path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Get a single entry by key. Returns None if not found or expired.
    pub fn get(&self, key: &str) -> Result<Option<CacheRow>, CacheError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "SELECT key, category, body, created_at, expires_at \
             FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
        )?;

        let result = stmt.query_row(rusqlite::params![key, now], |row| {
            Ok(CacheRow {
                key: row.get(0)?,
                category: row.get(1)?,
                body: row.get(2)?,
                created_at: row.get(3)?,
                expires_at: row.get(4)?,
            })
        });

        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CacheError::Sqlite(e)),
        }
    }

    /// Insert or replace an entry. Last write wins.
    pub fn upsert(&self, row: &CacheRow) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries \
             (key, category, body, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                row.key,
                row.category,
                row.body,
                row.created_at,
                row.expires_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<usize, CacheError> {
        let deleted = self.conn.execute(
            "DELETE FROM cache_entries WHERE key = ?1",
            rusqlite::params![key],
        )?;
        Ok(deleted)
    }

    /// Delete all expired entries. Returns the number of rows deleted.
    pub fn expire_stale(&self) -> Result<usize, CacheError> {
        let now = Utc::now().to_rfc3339();
        let deleted = self.conn.execute(
            "DELETE FROM cache_entries WHERE expires_at < ?1",
            rusqlite::params![now],
        )?;
        Ok(deleted)
    }

    /// Count all entries, expired or not.
    pub fn count(&self) -> Result<usize, CacheError> {
        let count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_row(key: &str, ttl_seconds: i64) -> CacheRow {
        let now = Utc::now();
        CacheRow {
            key: key.to_string(),
            category: "json".to_string(),
            body: r#"[{"page":1,"pages":1},[]]"#.to_string(),
            created_at: now.to_rfc3339(),
            expires_at: (now + Duration::seconds(ttl_seconds)).to_rfc3339(),
        }
    }

    #[test]
    fn upsert_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&make_row("req:https://a.test", 300)).unwrap();

        let row = store.get("req:https://a.test").unwrap().unwrap();
        assert_eq!(row.category, "json");
        assert!(row.body.contains("pages"));
    }

    #[test]
    fn get_missing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn get_expired_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&make_row("req:old", -10)).unwrap();
        assert!(store.get("req:old").unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_existing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut row = make_row("req:x", 300);
        store.upsert(&row).unwrap();
        row.body = "replaced".to_string();
        store.upsert(&row).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("req:x").unwrap().unwrap().body, "replaced");
    }

    #[test]
    fn expire_stale() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&make_row("req:fresh", 300)).unwrap();
        store.upsert(&make_row("req:old1", -10)).unwrap();
        store.upsert(&make_row("req:old2", -10)).unwrap();

        assert_eq!(store.expire_stale().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn delete_entry() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&make_row("req:gone", 300)).unwrap();
        assert_eq!(store.delete("req:gone").unwrap(), 1);
        assert!(store.get("req:gone").unwrap().is_none());
    }

    #[test]
    fn wal_mode_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let _store = SqliteStore::open(path.to_str().unwrap()).unwrap();
    }
}
