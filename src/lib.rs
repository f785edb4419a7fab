//! Two-tier read-through cache with HTTP response memoization.
//!
//! [`cache::HybridCache`] layers an in-process [`cache::LocalStore`] in front of
//! a shared [`cache::SharedStore`] (Postgres in production) behind a single
//! `get_or_create` operation with per-key singleflight. The axum middleware
//! [`cache::response_cache_layer`] uses it to memoize whole GET responses.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
