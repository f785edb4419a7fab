//! Metric names emitted by the cache. Descriptions are registered in
//! `infra::telemetry`.

pub const METRIC_LOCAL_HIT: &str = "hybrid_cache_local_hit_total";
pub const METRIC_SHARED_HIT: &str = "hybrid_cache_shared_hit_total";
pub const METRIC_MISS: &str = "hybrid_cache_miss_total";
pub const METRIC_COALESCED: &str = "hybrid_cache_coalesced_total";
pub const METRIC_STORE_ERROR: &str = "hybrid_cache_store_error_total";
pub const METRIC_LOCAL_EVICT: &str = "hybrid_cache_local_evict_total";
pub const METRIC_RESPONSE_BYPASS: &str = "hybrid_cache_response_bypass_total";
pub const METRIC_POPULATE_MS: &str = "hybrid_cache_populate_ms";
