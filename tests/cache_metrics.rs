use std::{collections::HashSet, num::NonZeroUsize, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
    middleware,
    routing::post,
};
use futures::future::join_all;
use hybrid_cache::{
    cache::{
        CacheConfig, EntryOptions, HybridCache, LocalStore, MemorySharedStore, MemoryStore,
        ResponseCacheState, SharedStore, SharedStorePolicy, StoreError, response_cache_layer,
    },
    infra::telemetry,
};
use metrics_util::debugging::DebuggingRecorder;
use tower::ServiceExt;

const TTL: Duration = Duration::from_secs(60);

struct UnreachableStore;

#[async_trait]
impl SharedStore for UnreachableStore {
    async fn get_string(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::new("connection refused"))
    }

    async fn set_string(
        &self,
        _key: &str,
        _value: &str,
        _options: EntryOptions,
    ) -> Result<(), StoreError> {
        Err(StoreError::new("connection refused"))
    }
}

fn local(capacity: usize) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(
        NonZeroUsize::new(capacity).expect("capacity"),
    ))
}

async fn fetch(cache: &HybridCache, key: &str) -> u32 {
    cache
        .get_or_create(
            key,
            || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, std::io::Error>(1_u32)
            },
            TTL,
        )
        .await
        .expect("value")
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    // miss, populate latency, then local hit
    let shared = Arc::new(MemorySharedStore::new());
    let cache = HybridCache::new(local(16), shared.clone(), SharedStorePolicy::FailFast);
    fetch(&cache, "a").await;
    fetch(&cache, "a").await;

    // shared hit from a second instance
    let other = HybridCache::new(local(16), shared, SharedStorePolicy::FailFast);
    fetch(&other, "a").await;

    // coalesced waiters
    join_all((0..4).map(|_| fetch(&cache, "b"))).await;

    // store errors under the degrade policy
    let degraded = HybridCache::new(
        local(16),
        Arc::new(UnreachableStore),
        SharedStorePolicy::Degrade,
    );
    fetch(&degraded, "c").await;

    // local eviction
    let tiny = local(1);
    tiny.set("x", Arc::new(1_u8), TTL);
    tiny.set("y", Arc::new(2_u8), TTL);

    // response bypass for non-GET requests
    let state = ResponseCacheState {
        config: CacheConfig::default(),
        cache: cache.clone(),
    };
    let app = Router::new()
        .route("/items", post(|| async { StatusCode::CREATED }))
        .layer(middleware::from_fn_with_state(state, response_cache_layer));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/items")
        .body(Body::empty())
        .expect("request should build");
    let response = app.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::CREATED);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "hybrid_cache_local_hit_total",
        "hybrid_cache_shared_hit_total",
        "hybrid_cache_miss_total",
        "hybrid_cache_coalesced_total",
        "hybrid_cache_store_error_total",
        "hybrid_cache_local_evict_total",
        "hybrid_cache_response_bypass_total",
        "hybrid_cache_populate_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
