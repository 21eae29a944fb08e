//! Bounded store of deals waiting on a follow-up reply

use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::warn;

/// Keyed by the outbound message that asked for the missing fields.
///
/// Entries are only ever inserted and removed, never touched in between, so
/// eviction drops the oldest insertion first.
#[derive(Debug)]
pub struct PendingFields<V> {
    entries: LruCache<String, V>,
}

impl<V> PendingFields<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Register `value` under `key`. Returns the entry evicted to make room,
    /// if any.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<(String, V)> {
        let key = key.into();
        let replacing = self.entries.contains(&key);
        let displaced = self.entries.push(key, value);
        if replacing {
            return None;
        }
        if let Some((evicted, _)) = &displaced {
            warn!("Pending store full, dropping oldest entry {}", evicted);
        }
        displaced
    }

    /// Remove and return the entry for `key`
    pub fn take(&mut self, key: &str) -> Option<V> {
        self.entries.pop(key)
    }

    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries.peek(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
