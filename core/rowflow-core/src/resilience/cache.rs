//! Query Cache — results keyed by exact query text
//!
//! Unbounded: entries live until `invalidate` or `clear`.
//! 동시 miss는 중복 제거되지 않으며 마지막 쓰기가 남습니다.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Concurrency-safe result cache shared across threads.
pub struct QueryCache<V> {
    entries: DashMap<String, V>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl<V: Clone> QueryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// Looks up `key`, counting a hit or a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes one entry, returning it.
    pub fn invalidate(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    /// Removes every entry and resets the counters.
    pub fn clear(&self) {
        self.entries.clear();
        self.hit_count.store(0, Ordering::Relaxed);
        self.miss_count.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hit_count.load(Ordering::Relaxed);
        let total = hits + self.miss_count.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl<V: Clone> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}
