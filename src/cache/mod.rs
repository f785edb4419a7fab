//! Hybrid cache system
//!
//! Two tiers behind one get-or-create operation:
//!
//! - **Local**: in-process LRU with per-entry TTL ([`MemoryStore`])
//! - **Shared**: string store visible to every instance ([`SharedStore`]),
//!   Postgres in production, [`MemorySharedStore`] for tests
//!
//! [`response_cache_layer`] builds on [`HybridCache`] to memoize GET responses.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! response_ttl_seconds = 300
//! local_capacity = 1024
//! shared_store_policy = "fail_fast"
//! # ... see config.rs for all options
//! ```

mod config;
pub mod error;
mod flight;
mod hybrid;
mod keys;
mod local;
mod lock;
mod middleware;
mod shared;
pub mod stats;

pub use config::{CacheConfig, SharedStorePolicy};
pub use error::{HybridCacheError, StoreError};
pub use hybrid::HybridCache;
pub use keys::{is_memoizable, response_key};
pub use local::{CachedValue, LocalStore, MemoryStore};
pub use middleware::{
    CACHED_CONTENT_TYPE, ResponseCacheState, ResponseCaptureError, UncacheableReason,
    response_cache_layer,
};
pub use shared::{EntryOptions, MemorySharedStore, SharedStore};
