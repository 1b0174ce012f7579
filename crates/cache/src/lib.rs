//! Bounded in-memory cache with per-entry TTL and strict LRU eviction.

use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            default_ttl: Duration::from_secs(600),
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_accessed_at: Instant,
}

/// Bounded key-value store. Expiry is enforced lazily on read; eviction is
/// strict least-recently-used, one entry per over-capacity insert.
pub struct EvictionCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    config: CacheConfig,
}

impl<K, V> EvictionCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Look up a key. An expired entry is removed and reported absent; a hit
    /// refreshes the entry's recency.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        let expired = match entries.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => return None,
        };
        if expired {
            entries.remove(key);
            return None;
        }

        let entry = entries.get_mut(key)?;
        entry.last_accessed_at = now;
        Some(entry.value.clone())
    }

    /// Insert with the configured default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    /// Insert with an explicit TTL. Inserting a new key into a full cache
    /// first evicts the entry with the oldest last access.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        if self.config.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.lock();
        let now = Instant::now();

        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            let victim = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed_at)
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                entries.remove(&victim);
                debug!("evicted least recently used entry at capacity {}", self.config.max_entries);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
                last_accessed_at: now,
            },
        );
    }

    /// Remove a key. Returns false for an absent key.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.lock().remove(key).is_some()
    }

    /// Expiry-aware presence check. Does not refresh recency.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => return false,
        };
        if expired {
            entries.remove(key);
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Eagerly drop every expired entry. Lazy expiry on read keeps the cache
    /// correct without this; the sweep only bounds memory held by entries
    /// that are never re-read.
    pub fn prune_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

impl<V: Clone> EvictionCache<String, V> {
    /// Drop every entry whose key starts with `prefix`. Supports namespaced
    /// invalidation for string-keyed caches.
    pub fn remove_namespace(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }
}
