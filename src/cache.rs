use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub body: String,
    pub cached_at: DateTime<Utc>, // when the conversion finished
}

/// Converted calendars keyed by the literal feed url.
///
/// Stale entries are only shadowed on read; they leave the map when a sweep
/// runs or when a new key needs room at capacity.
#[derive(Debug)]
pub struct FeedCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(CACHE_TTL, DEFAULT_CAPACITY)
    }
}

impl FeedCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the entry for `url` unless it is missing or older than the TTL.
    pub async fn get(&self, url: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        entries
            .get(url)
            .filter(|entry| !self.is_expired(entry, Utc::now()))
            .cloned()
    }

    /// Stores `body` for `url`, replacing whatever was there.
    pub async fn set(&self, url: &str, body: String) -> CacheEntry {
        self.insert_at(url, body, Utc::now()).await
    }

    /// Number of stored entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops every entry past the TTL and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }

    async fn insert_at(&self, url: &str, body: String, cached_at: DateTime<Utc>) -> CacheEntry {
        let entry = CacheEntry { body, cached_at };
        let mut entries = self.entries.write().await;

        if !entries.contains_key(url) && entries.len() >= self.capacity {
            entries.retain(|_, cached| !self.is_expired(cached, entry.cached_at));

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, cached)| cached.cached_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    debug!(url = %oldest, "cache full, evicting oldest entry");
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(url.to_string(), entry.clone());
        entry
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        // A negative age (clock stepped back) counts as fresh.
        (now - entry.cached_at)
            .to_std()
            .is_ok_and(|age| age > self.ttl)
    }
}

/// Periodically removes expired entries so unused feeds do not pile up.
pub fn spawn_sweeper(cache: Arc<FeedCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let removed = cache.purge_expired().await;
            if removed > 0 {
                debug!(removed, "purged expired calendars");
            }
        }
    })
}
