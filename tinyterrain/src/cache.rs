//! Thread-safe, fixed-capacity LRU cache of decoded chunks.
//!
//! Built on the `lru` crate's `LruCache` — the same crate this corpus uses
//! for an analogous region cache — wrapped in a `parking_lot::RwLock`.
//! `parking_lot` rather than `std::sync` because a poisoned std lock would
//! permanently wedge the cache after any panicking evictee write-back, and
//! this corpus already reaches for `parking_lot` elsewhere for exactly that
//! reason.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::RwLock;

use crate::coord::Coord2;

/// A fixed-capacity, thread-safe map from chunk coordinate to decoded chunk,
/// ordered by recency of use.
pub struct ChunkCache<T> {
    inner: RwLock<LruCache<Coord2, T>>,
}

impl<T: Clone> ChunkCache<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// On hit, promotes `coord` to most-recently-used and returns a clone of
    /// its value. Acquires the *write* lock: reading still mutates recency
    /// order, so a shared read lock would race with concurrent reorders.
    pub fn get(&self, coord: Coord2) -> Option<T> {
        self.inner.write().get(&coord).cloned()
    }

    /// Inserts or overwrites `coord`. If `coord` was already present, its
    /// value is replaced in place and moved to the front; `None` is
    /// returned (overwriting is not an eviction). If `coord` is new and
    /// insertion pushes the cache over capacity, the least-recently-used
    /// entry is evicted and returned.
    pub fn put(&self, coord: Coord2, value: T) -> Option<(Coord2, T)> {
        match self.inner.write().push(coord, value) {
            Some((evicted_coord, evicted_value)) if evicted_coord == coord => None,
            other => other,
        }
    }

    /// Every entry, most-recently-used first. Used to flush the cache on
    /// shutdown.
    pub fn drain_mru_order(&self) -> Vec<(Coord2, T)> {
        self.inner
            .write()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
