//! Shared tier of the hybrid cache: a string store visible to every instance.

use std::{collections::HashMap, sync::RwLock, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;

use super::error::StoreError;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::shared";

/// Expiration options attached to a shared-store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOptions {
    pub absolute_expiration_relative_to_now: Duration,
}

impl EntryOptions {
    pub fn expires_in(ttl: Duration) -> Self {
        Self {
            absolute_expiration_relative_to_now: ttl,
        }
    }
}

/// String key/value store with TTL, shared across process instances.
///
/// Implementations must tolerate concurrent readers and writers from several
/// processes. Expired entries must never be returned by [`get_string`].
///
/// [`get_string`]: SharedStore::get_string
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        options: EntryOptions,
    ) -> Result<(), StoreError>;

    /// Physically remove expired entries, returning how many were deleted.
    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}

struct SharedEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local [`SharedStore`], for tests and single-instance deployments
/// without a database.
#[derive(Default)]
pub struct MemorySharedStore {
    entries: RwLock<HashMap<String, SharedEntry>>,
}

impl MemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedStore for MemorySharedStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = rw_read(&self.entries, SOURCE, "get_string");
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        options: EntryOptions,
    ) -> Result<(), StoreError> {
        let entry = SharedEntry {
            value: value.to_string(),
            expires_at: Instant::now() + options.absolute_expiration_relative_to_now,
        };
        rw_write(&self.entries, SOURCE, "set_string").insert(key.to_string(), entry);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "purge_expired");
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}
