//! Lazily-populated, instance-owned lookup caches.
//!
//! A key that was never looked up has no entry. A key that was looked up holds
//! a `Cached` value recording either the result or the fact that there is no
//! result, so "explicitly absent" is never confused with "not computed yet".
//!
//! Concurrent first lookups of the same key may both compute the value; the
//! computation must be idempotent and the last write wins.

use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

/// A computed cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<T> {
    /// The lookup ran and found nothing
    Absent,
    /// The lookup ran and produced a value
    Present(T),
}

impl<T> Cached<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Cached::Present(v),
            None => Cached::Absent,
        }
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Cached::Present(v) => Some(v),
            Cached::Absent => None,
        }
    }
}

/// Thread-safe memo table keyed by `K`.
#[derive(Debug)]
pub struct CacheMap<K, V> {
    entries: Mutex<FxHashMap<K, Cached<V>>>,
}

impl<K: Eq + Hash, V: Clone> CacheMap<K, V> {
    pub fn new() -> Self {
        CacheMap {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Returns `None` when the key was never computed.
    pub fn peek(&self, key: &K) -> Option<Cached<V>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Look the key up, computing and storing it on a miss.
    ///
    /// The lock is not held while `compute` runs.
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> Option<V>
    where
        F: FnOnce() -> Option<V>,
    {
        if let Some(hit) = self.peek(&key) {
            return hit.as_option().cloned();
        }

        let value = compute();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Cached::from_option(value.clone()));
        value
    }

    pub fn insert(&self, key: K, value: Cached<V>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash, V: Clone> Default for CacheMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
