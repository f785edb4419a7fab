//! Cache configuration.
//!
//! Controls the hybrid cache tiers and response memoization via the `[cache]`
//! section of `hybrid-cache.toml`.

use std::{fmt, num::NonZeroUsize, str::FromStr, time::Duration};

use serde::Deserialize;

const DEFAULT_RESPONSE_TTL_SECS: u64 = 300;
const DEFAULT_LOCAL_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(capacity) => capacity,
    None => unreachable!(),
};
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// What to do when the shared store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedStorePolicy {
    /// Fail the `get_or_create` call with a backing-store error.
    #[default]
    FailFast,
    /// Treat read failures as a miss and serve from the local tier when writes fail.
    Degrade,
}

impl SharedStorePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharedStorePolicy::FailFast => "fail_fast",
            SharedStorePolicy::Degrade => "degrade",
        }
    }
}

impl fmt::Display for SharedStorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharedStorePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(SharedStorePolicy::FailFast),
            "degrade" => Ok(SharedStorePolicy::Degrade),
            other => Err(format!(
                "unknown shared store policy `{other}` (expected `fail_fast` or `degrade`)"
            )),
        }
    }
}

/// Runtime cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Enable response memoization.
    pub enabled: bool,
    /// TTL applied to memoized responses in both tiers.
    pub response_ttl: Duration,
    /// Maximum entries held by the in-process tier.
    pub local_capacity: NonZeroUsize,
    /// Largest response body that will be captured and cached.
    pub max_body_bytes: usize,
    /// Behavior when the shared store is unreachable.
    pub shared_store_policy: SharedStorePolicy,
    /// How often expired shared entries are purged.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            response_ttl: Duration::from_secs(DEFAULT_RESPONSE_TTL_SECS),
            local_capacity: DEFAULT_LOCAL_CAPACITY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            shared_store_policy: SharedStorePolicy::FailFast,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            response_ttl: settings.response_ttl,
            local_capacity: settings.local_capacity,
            max_body_bytes: settings.max_body_bytes.get(),
            shared_store_policy: settings.shared_store_policy,
            sweep_interval: settings.sweep_interval,
        }
    }
}
