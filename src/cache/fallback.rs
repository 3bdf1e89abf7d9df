//! In-Process Fallback Map
//!
//! Serves the volatile contract while the shared cache is unreachable.
//!
//! # Design
//!
//! - DashMap shards give mutual exclusion around the read-expire-remove step
//! - Expiry is lazy: checked on read, never swept in the background
//! - Pattern deletion is approximated by a linear prefix scan

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;

use super::entry::CacheEntry;

/// TTL-aware in-process key/value map
#[derive(Debug, Default)]
pub struct FallbackMap {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl FallbackMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live value, dropping it if it has expired
    pub fn get(&self, key: &str) -> Option<Bytes> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.data().clone());
            }
            Some(_) => {}
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        // Re-check under the shard write lock; a concurrent insert may have
        // replaced the expired entry.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
        {
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace a value
    pub fn insert(&self, key: impl Into<String>, data: Bytes, ttl: Duration) {
        self.entries.insert(key.into(), CacheEntry::new(data, ttl));
    }

    /// Remove a key, returning whether a live entry was present
    pub fn remove(&self, key: &str) -> bool {
        self.entries
            .remove(key)
            .map(|(_, entry)| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Remove every key starting with `prefix`, returning how many live
    /// entries were dropped
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            if key.starts_with(prefix) {
                if !entry.is_expired() {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        removed
    }

    /// Count live entries starting with `prefix`
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired())
            .count()
    }

    /// Number of stored entries, including expired ones not yet read
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, returning the live ones with their remaining TTL
    pub fn drain(&self) -> Vec<(String, Bytes, Duration)> {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, entry)| (key, entry.data().clone(), entry.remaining()))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_insert_get() {
        let map = FallbackMap::new();
        map.insert("ns:a", data("one"), Duration::from_secs(60));

        assert_eq!(map.get("ns:a"), Some(data("one")));
        assert_eq!(map.get("ns:b"), None);
        assert_eq!(map.hits(), 1);
        assert_eq!(map.misses(), 1);
    }

    #[test]
    fn test_lazy_expiry() {
        let map = FallbackMap::new();
        map.insert("ns:a", data("one"), Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(25));

        // Still stored until someone reads it
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("ns:a"), None);
        assert_eq!(map.len(), 0);
        assert_eq!(map.expirations(), 1);
    }

    #[test]
    fn test_replace_resets_ttl() {
        let map = FallbackMap::new();
        map.insert("k", data("old"), Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(25));
        map.insert("k", data("new"), Duration::from_secs(60));
        assert_eq!(map.get("k"), Some(data("new")));
    }

    #[test]
    fn test_remove_prefix() {
        let map = FallbackMap::new();
        let ttl = Duration::from_secs(60);
        map.insert("ns:session:2024:5:FP1", data("a"), ttl);
        map.insert("ns:session:2024:5:R", data("b"), ttl);
        map.insert("ns:session:2024:50:R", data("c"), ttl);
        map.insert("ns:session:2024:6:R", data("d"), ttl);

        assert_eq!(map.remove_prefix("ns:session:2024:5:"), 2);
        assert_eq!(map.len(), 2);
        assert!(map.get("ns:session:2024:50:R").is_some());
        assert!(map.get("ns:session:2024:6:R").is_some());
    }

    #[test]
    fn test_remove_and_count() {
        let map = FallbackMap::new();
        map.insert("ns:a", data("1"), Duration::from_secs(60));
        map.insert("ns:b", data("2"), Duration::from_secs(60));
        map.insert("other:c", data("3"), Duration::from_secs(60));

        assert_eq!(map.count_prefix("ns:"), 2);
        assert!(map.remove("ns:a"));
        assert!(!map.remove("ns:a"));
        assert_eq!(map.count_prefix("ns:"), 1);

        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_drain_skips_expired() {
        let map = FallbackMap::new();
        map.insert("ns:live", data("1"), Duration::from_secs(60));
        map.insert("ns:gone", data("2"), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));

        let drained = map.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, "ns:live");
        assert!(drained[0].2 <= Duration::from_secs(60));
        assert!(map.is_empty());
    }
}
