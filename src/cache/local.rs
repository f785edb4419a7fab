//! In-process tier of the hybrid cache.

use std::{
    any::Any,
    num::NonZeroUsize,
    sync::{Arc, RwLock},
    time::Duration,
};

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::lock::{rw_read, rw_write};
use super::stats::METRIC_LOCAL_EVICT;

const SOURCE: &str = "cache::local";

/// A type-erased cached value. Callers downcast to the type they stored.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Process-local key/value store with per-entry TTL.
///
/// Lookups are synchronous and must not block on I/O.
pub trait LocalStore: Send + Sync {
    /// Return the value for `key` if present and not expired.
    fn try_get(&self, key: &str) -> Option<CachedValue>;

    /// Store `value` under `key`, replacing any previous entry, expiring `ttl` from now.
    fn set(&self, key: &str, value: CachedValue, ttl: Duration);
}

struct LocalEntry {
    value: CachedValue,
    expires_at: Instant,
}

/// LRU-bounded in-memory [`LocalStore`].
///
/// Expired entries are dropped lazily on lookup; capacity pressure evicts the
/// least recently used entry.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, LocalEntry>>,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    /// Number of entries held, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStore for MemoryStore {
    fn try_get(&self, key: &str) -> Option<CachedValue> {
        let mut entries = rw_write(&self.entries, SOURCE, "try_get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(Arc::clone(&entry.value));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    fn set(&self, key: &str, value: CachedValue, ttl: Duration) {
        let entry = LocalEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let evicted = rw_write(&self.entries, SOURCE, "set").push(key.to_string(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_LOCAL_EVICT).increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn store(capacity: usize) -> MemoryStore {
        MemoryStore::new(NonZeroUsize::new(capacity).expect("non-zero capacity"))
    }

    fn read_string(store: &MemoryStore, key: &str) -> Option<String> {
        store
            .try_get(key)
            .and_then(|value| value.downcast_ref::<String>().cloned())
    }

    #[test]
    fn set_then_get_returns_value() {
        let store = store(4);
        assert!(store.try_get("a").is_none());

        store.set("a", Arc::new("alpha".to_string()), Duration::from_secs(60));

        assert_eq!(read_string(&store, "a").as_deref(), Some("alpha"));
    }

    #[test]
    fn set_overwrites_whole_entry() {
        let store = store(4);
        store.set("a", Arc::new("first".to_string()), Duration::from_secs(60));
        store.set("a", Arc::new("second".to_string()), Duration::from_secs(60));

        assert_eq!(read_string(&store, "a").as_deref(), Some("second"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_dropped_on_lookup() {
        let store = store(4);
        store.set("a", Arc::new("alpha".to_string()), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.try_get("a").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.try_get("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn lru_eviction_drops_least_recent() {
        let store = store(2);
        let ttl = Duration::from_secs(60);

        store.set("one", Arc::new(1_u32), ttl);
        store.set("two", Arc::new(2_u32), ttl);
        // Touch "one" so "two" becomes least recently used.
        assert!(store.try_get("one").is_some());
        store.set("three", Arc::new(3_u32), ttl);

        assert!(store.try_get("one").is_some());
        assert!(store.try_get("two").is_none());
        assert!(store.try_get("three").is_some());
    }

    #[test]
    fn clear_drops_every_entry() {
        let store = store(4);
        let ttl = Duration::from_secs(60);
        store.set("a", Arc::new(1_u8), ttl);
        store.set("b", Arc::new(2_u8), ttl);
        assert_eq!(store.len(), 2);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn recovers_from_poisoned_lock() {
        let store = store(4);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.set("a", Arc::new("alpha".to_string()), Duration::from_secs(60));
        assert_eq!(read_string(&store, "a").as_deref(), Some("alpha"));
    }
}
