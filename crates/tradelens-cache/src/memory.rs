use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use tradelens_models::cache_schema::CacheCategory;
use tradelens_models::config::MAX_TTL_SECONDS;

/// A cached payload body and its absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub body: String,
    pub category: CacheCategory,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// `ttl` is clamped to [`MAX_TTL_SECONDS`], so "forever" means a century.
    pub fn new(key: String, body: String, category: CacheCategory, ttl: Duration) -> Self {
        let ttl = ttl.min(Duration::from_secs(MAX_TTL_SECONDS));
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            key,
            body,
            category,
            expires_at,
        }
    }

    /// Time left before expiry, zero if already expired.
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// Expires each entry at its own `expires_at` rather than a cache-wide TTL.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.remaining())
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.remaining())
    }
}

/// In-memory hot cache backed by moka.
///
/// Bounded by entry count; each entry expires at its own TTL.
pub struct MemoryCache {
    inner: Cache<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(EntryExpiry)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.get(key).await.filter(CacheEntry::is_live)
    }

    pub async fn insert(&self, entry: CacheEntry) {
        self.inner.insert(entry.key.clone(), entry).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Flush moka's pending maintenance so `entry_count` is exact.
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
