//! Two-tier get-or-create cache.

use std::{future::Future, sync::Arc, time::Duration};

use futures::FutureExt;
use metrics::{counter, histogram};
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;
use tracing::{Instrument, debug, instrument, warn};

use super::{
    config::SharedStorePolicy,
    error::{BoxError, HybridCacheError},
    flight::InFlight,
    local::{CachedValue, LocalStore},
    stats::{
        METRIC_COALESCED, METRIC_LOCAL_HIT, METRIC_MISS, METRIC_POPULATE_MS, METRIC_SHARED_HIT,
        METRIC_STORE_ERROR,
    },
    shared::{EntryOptions, SharedStore},
};

/// Read-through cache with an in-process tier in front of a shared tier.
///
/// Lookups go local → shared → factory. A shared hit refreshes the local copy;
/// a miss writes the factory's value to both tiers with the same TTL. Misses on
/// the same key are coalesced: one caller populates, the rest await its result.
///
/// Population runs on a spawned task, so a caller that is cancelled while the
/// factory runs does not stop it; the result still lands in both tiers.
#[derive(Clone)]
pub struct HybridCache {
    tiers: Arc<Tiers>,
    in_flight: InFlight,
}

struct Tiers {
    local: Arc<dyn LocalStore>,
    shared: Arc<dyn SharedStore>,
    policy: SharedStorePolicy,
}

impl HybridCache {
    pub fn new(
        local: Arc<dyn LocalStore>,
        shared: Arc<dyn SharedStore>,
        policy: SharedStorePolicy,
    ) -> Self {
        Self {
            tiers: Arc::new(Tiers {
                local,
                shared,
                policy,
            }),
            in_flight: InFlight::new(),
        }
    }

    pub fn policy(&self) -> SharedStorePolicy {
        self.tiers.policy
    }

    /// Return the cached value for `key`, or build it with `factory` and cache it.
    ///
    /// Every call site using a given key must request the same `T`. The
    /// factory is invoked at most once per population; if it fails, nothing
    /// is written and every caller waiting on that population gets the error.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn get_or_create<T, F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Duration,
    ) -> Result<T, HybridCacheError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        if key.is_empty() {
            return Err(HybridCacheError::InvalidKey);
        }
        if ttl.is_zero() {
            return Err(HybridCacheError::InvalidTtl);
        }

        if let Some(value) = self.tiers.local_value::<T>(key) {
            counter!(METRIC_LOCAL_HIT).increment(1);
            debug!(tier = "local", outcome = "hit", "serving cached value");
            return Ok(value);
        }

        let (flight, started) = self.in_flight.join_or_start(key, |guard| {
            let tiers = Arc::clone(&self.tiers);
            let owned_key = key.to_string();
            let population = async move {
                let _guard = guard;
                tiers.populate(&owned_key, factory, ttl).await
            };
            let key = key.to_string();
            async move {
                match tokio::spawn(population.in_current_span()).await {
                    Ok(result) => result,
                    Err(join_error) => Err(HybridCacheError::Aborted {
                        key,
                        reason: join_error.to_string(),
                    }),
                }
            }
            .boxed()
        });

        if !started {
            counter!(METRIC_COALESCED).increment(1);
            debug!(outcome = "coalesced", "awaiting in-flight population");
        }

        let value = flight.await?;
        downcast(key, value)
    }
}

impl Tiers {
    fn local_value<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        // A value stored under a different type counts as a local miss.
        self.local
            .try_get(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    async fn populate<T, F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Duration,
    ) -> Result<CachedValue, HybridCacheError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        // A flight that finished between our local miss and registering this
        // one has already filled the local tier.
        if let Some(value) = self.local.try_get(key)
            && value.is::<T>()
        {
            counter!(METRIC_LOCAL_HIT).increment(1);
            return Ok(value);
        }

        if let Some(payload) = self.read_shared(key).await? {
            let value: T = serde_json::from_str(&payload)
                .map_err(|err| HybridCacheError::deserialize(key, err.to_string()))?;
            counter!(METRIC_SHARED_HIT).increment(1);
            debug!(tier = "shared", outcome = "hit", "refreshing local copy");

            let value: CachedValue = Arc::new(value);
            self.local.set(key, Arc::clone(&value), ttl);
            return Ok(value);
        }

        counter!(METRIC_MISS).increment(1);
        debug!(outcome = "miss", "invoking value factory");
        let started_at = Instant::now();

        let value = factory()
            .await
            .map_err(|err| HybridCacheError::factory(key, err.into()))?;
        let payload =
            serde_json::to_string(&value).map_err(|err| HybridCacheError::serialize(key, err))?;

        self.write_shared(key, &payload, ttl).await?;

        let value: CachedValue = Arc::new(value);
        self.local.set(key, Arc::clone(&value), ttl);

        histogram!(METRIC_POPULATE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(value)
    }

    async fn read_shared(&self, key: &str) -> Result<Option<String>, HybridCacheError> {
        match self.shared.get_string(key).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                counter!(METRIC_STORE_ERROR, "op" => "read").increment(1);
                match self.policy {
                    SharedStorePolicy::FailFast => Err(HybridCacheError::shared_store(key, err)),
                    SharedStorePolicy::Degrade => {
                        warn!(
                            tier = "shared",
                            op = "read",
                            error = %err,
                            "shared store unavailable, treating as miss"
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    async fn write_shared(
        &self,
        key: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<(), HybridCacheError> {
        match self
            .shared
            .set_string(key, payload, EntryOptions::expires_in(ttl))
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                counter!(METRIC_STORE_ERROR, "op" => "write").increment(1);
                match self.policy {
                    SharedStorePolicy::FailFast => Err(HybridCacheError::shared_store(key, err)),
                    SharedStorePolicy::Degrade => {
                        warn!(
                            tier = "shared",
                            op = "write",
                            error = %err,
                            "shared store unavailable, caching locally only"
                        );
                        Ok(())
                    }
                }
            }
        }
    }
}

fn downcast<T>(key: &str, value: CachedValue) -> Result<T, HybridCacheError>
where
    T: Clone + Send + Sync + 'static,
{
    value.downcast_ref::<T>().cloned().ok_or_else(|| {
        HybridCacheError::deserialize(
            key,
            format!(
                "in-flight value is not a `{}`",
                std::any::type_name::<T>()
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        num::NonZeroUsize,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::cache::{MemorySharedStore, MemoryStore};

    fn cache() -> (HybridCache, Arc<MemoryStore>, Arc<MemorySharedStore>) {
        let local = Arc::new(MemoryStore::new(NonZeroUsize::new(16).expect("capacity")));
        let shared = Arc::new(MemorySharedStore::new());
        let cache = HybridCache::new(
            local.clone(),
            shared.clone(),
            SharedStorePolicy::FailFast,
        );
        (cache, local, shared)
    }

    #[tokio::test]
    async fn rejects_empty_key_before_touching_stores() {
        let (cache, local, shared) = cache();
        let result = cache
            .get_or_create("", || async { Ok::<_, Infallible>(1_u32) }, Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(HybridCacheError::InvalidKey)));
        assert!(local.is_empty());
        assert!(shared.is_empty());
    }

    #[tokio::test]
    async fn rejects_zero_ttl() {
        let (cache, _, _) = cache();
        let result = cache
            .get_or_create("k", || async { Ok::<_, Infallible>(1_u32) }, Duration::ZERO)
            .await;

        assert!(matches!(result, Err(HybridCacheError::InvalidTtl)));
    }

    #[tokio::test]
    async fn miss_writes_serialized_value_to_shared_tier() {
        let (cache, local, shared) = cache();
        let value = cache
            .get_or_create(
                "numbers",
                || async { Ok::<_, Infallible>(vec![1_u32, 2, 3]) },
                Duration::from_secs(60),
            )
            .await
            .expect("value");

        assert_eq!(value, vec![1, 2, 3]);
        assert_eq!(
            shared.get_string("numbers").await.expect("get").as_deref(),
            Some("[1,2,3]")
        );
        assert_eq!(local.len(), 1);
        assert_eq!(cache.in_flight.len(), 0);
    }

    #[tokio::test]
    async fn local_value_of_other_type_falls_through_to_shared_tier() {
        let (cache, local, shared) = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        shared
            .set_string("k", "\"text\"", EntryOptions::expires_in(Duration::from_secs(60)))
            .await
            .expect("seed shared");
        local.set("k", Arc::new(42_u64), Duration::from_secs(60));

        let counter = Arc::clone(&calls);
        let value: String = cache
            .get_or_create(
                "k",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>("fresh".to_string())
                },
                Duration::from_secs(60),
            )
            .await
            .expect("value");

        assert_eq!(value, "text");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undecodable_shared_payload_is_a_serialization_error() {
        let (cache, local, shared) = cache();
        shared
            .set_string("k", "not json", EntryOptions::expires_in(Duration::from_secs(60)))
            .await
            .expect("seed shared");

        let result = cache
            .get_or_create("k", || async { Ok::<_, Infallible>(1_u32) }, Duration::from_secs(60))
            .await;

        match result {
            Err(HybridCacheError::Serialization { operation, key, .. }) => {
                assert_eq!(operation, "deserialize");
                assert_eq!(key, "k");
            }
            other => panic!("expected serialization error, got {other:?}"),
        }
        assert!(local.is_empty());
    }
}
