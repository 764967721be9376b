use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tradelens_models::cache_schema::{CacheCategory, CacheRow};
use tradelens_models::config::CacheConfig;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::memory::{CacheEntry, MemoryCache};
use crate::sqlite::SqliteStore;

/// Read-through, write-through payload cache: moka (authoritative) → SQLite (optional).
///
/// Constructed once and shared behind an `Arc` by every in-flight fetch.
/// Concurrent writers for the same key race harmlessly: payloads are immutable
/// once written, so the last write wins.
///
/// The SQLite tier is best-effort. A failed write (disk full, locked file,
/// quota) is logged and dropped; the memory tier still holds the entry.
pub struct CacheStore {
    memory: MemoryCache,
    persistent: Option<Mutex<SqliteStore>>,
    default_ttl: Duration,
}

impl CacheStore {
    pub fn new(max_capacity: u64, default_ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_capacity),
            persistent: None,
            default_ttl,
        }
    }

    /// Attach a persistent tier.
    pub fn with_persistence(mut self, sqlite: SqliteStore) -> Self {
        self.persistent = Some(Mutex::new(sqlite));
        self
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let store = Self::new(
            config.memory_max_capacity,
            Duration::from_secs(config.default_ttl_seconds),
        );
        match &config.sqlite_path {
            Some(path) => Ok(store.with_persistence(SqliteStore::open(path)?)),
            None => Ok(store),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live entry. Checks memory first, then SQLite, promoting SQLite hits.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory.get(key).await {
            return Some(entry);
        }

        let row = match self.persistent_get(key) {
            Ok(row) => row?,
            Err(e) => {
                warn!(key, error = %e, "Persistent cache read failed");
                return None;
            }
        };

        match row_to_entry(row) {
            Ok(entry) if entry.is_live() => {
                debug!(key, "Promoting persistent cache hit to memory");
                self.memory.insert(entry.clone()).await;
                Some(entry)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable cache row");
                None
            }
        }
    }

    /// Store a body. `ttl` falls back to the store default.
    pub async fn put(
        &self,
        key: String,
        body: String,
        category: CacheCategory,
        ttl: Option<Duration>,
    ) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return;
        }

        let entry = CacheEntry::new(key, body, category, ttl);
        if let Err(e) = self.persistent_put(&entry) {
            warn!(key = %entry.key, error = %e, "Persistent cache write failed; keeping memory entry only");
        }
        self.memory.insert(entry).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.memory.invalidate(key).await;
        if let Some(persistent) = &self.persistent {
            match persistent.lock() {
                Ok(sqlite) => {
                    if let Err(e) = sqlite.delete(key) {
                        warn!(key, error = %e, "Persistent cache delete failed");
                    }
                }
                Err(e) => warn!(error = %e, "Persistent cache mutex poisoned"),
            }
        }
    }

    /// Prune expired rows from the persistent tier. Moka evicts on its own.
    pub async fn clear_expired(&self) -> Result<usize, CacheError> {
        self.memory.run_pending_tasks().await;
        match &self.persistent {
            Some(persistent) => {
                let sqlite = persistent
                    .lock()
                    .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
                sqlite.expire_stale()
            }
            None => Ok(0),
        }
    }

    /// Number of entries in the memory tier after pending maintenance.
    pub async fn entry_count(&self) -> u64 {
        self.memory.run_pending_tasks().await;
        self.memory.entry_count()
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.is_some()
    }

    fn persistent_get(&self, key: &str) -> Result<Option<CacheRow>, CacheError> {
        let Some(persistent) = &self.persistent else {
            return Ok(None);
        };
        let sqlite = persistent
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
        sqlite.get(key)
    }

    fn persistent_put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let Some(persistent) = &self.persistent else {
            return Ok(());
        };
        let now = Utc::now().to_rfc3339();
        let row = CacheRow {
            key: entry.key.clone(),
            category: entry.category.as_str().to_string(),
            body: entry.body.clone(),
            created_at: now,
            expires_at: entry.expires_at.to_rfc3339(),
        };
        let sqlite = persistent
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
        sqlite.upsert(&row)
    }
}

fn row_to_entry(row: CacheRow) -> Result<CacheEntry, CacheError> {
    let category = CacheCategory::parse(&row.category).ok_or_else(|| CacheError::InvalidRow {
        key: row.key.clone(),
        reason: format!("unknown category {}", row.category),
    })?;
    let expires_at = DateTime::parse_from_rfc3339(&row.expires_at)
        .map_err(|e| CacheError::InvalidRow {
            key: row.key.clone(),
            reason: format!("bad expires_at: {e}"),
        })?
        .with_timezone(&Utc);
    Ok(CacheEntry {
        key: row.key,
        body: row.body,
        category,
        expires_at,
    })
}
