//! Rendered tile cache keyed by tile coordinate.
//!
//! Entries are kept in insertion order: reads never refresh an entry, so the
//! LRU end of the underlying list is always the oldest insertion. Exactly one
//! eviction policy is active per cache.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tile coordinate used as cache key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TileKey {
    pub x: u64,
    pub y: u64,
    pub z: u32,
}

impl TileKey {
    #[must_use]
    pub const fn new(x: u64, y: u64, z: u32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Keep at most this many tiles, dropping the oldest insertion first.
    /// Zero disables caching.
    MaxEntries(usize),
    /// Drop tiles once they are older than this.
    TimeToLive(Duration),
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::MaxEntries(100)
    }
}

struct CacheEntry<V> {
    data: Arc<V>,
    inserted: Instant,
}

pub struct TileCache<V> {
    policy: CachePolicy,
    entries: Mutex<LruCache<TileKey, CacheEntry<V>>>,
}

impl<V> TileCache<V> {
    #[must_use]
    pub fn new(policy: CachePolicy) -> Self {
        TileCache {
            policy,
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<TileKey, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &TileKey) -> Option<Arc<V>> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &TileKey, now: Instant) -> Option<Arc<V>> {
        let mut entries = self.lock();
        let expired = match (self.policy, entries.peek(key)) {
            (_, None) => return None,
            (CachePolicy::TimeToLive(ttl), Some(entry)) => now.duration_since(entry.inserted) > ttl,
            (CachePolicy::MaxEntries(_), Some(_)) => false,
        };
        if expired {
            entries.pop(key);
            debug!(tile = %key, "cache entry expired");
            return None;
        }
        entries.peek(key).map(|entry| Arc::clone(&entry.data))
    }

    pub fn put(&self, key: TileKey, data: Arc<V>) {
        self.put_at(key, data, Instant::now());
    }

    fn put_at(&self, key: TileKey, data: Arc<V>, now: Instant) {
        if self.policy == CachePolicy::MaxEntries(0) {
            return;
        }
        let mut entries = self.lock();
        // re-inserting a key counts as a fresh insertion
        entries.pop(&key);
        entries.put(key, CacheEntry { data, inserted: now });

        match self.policy {
            CachePolicy::MaxEntries(capacity) => {
                while entries.len() > capacity {
                    if let Some((evicted, _)) = entries.pop_lru() {
                        debug!(tile = %evicted, "evicted oldest cached tile");
                    }
                }
            }
            CachePolicy::TimeToLive(ttl) => {
                while let Some((_, oldest)) = entries.peek_lru() {
                    if now.duration_since(oldest.inserted) <= ttl {
                        break;
                    }
                    if let Some((evicted, _)) = entries.pop_lru() {
                        debug!(tile = %evicted, "evicted expired cached tile");
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
