//! Response memoization middleware.
//!
//! GET responses are cached whole through the [`HybridCache`], keyed by path
//! and raw query string, and always replayed as `application/json`. Other
//! methods pass straight through.

use std::fmt;

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderMap, HeaderValue, Request, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, instrument};

use super::{
    CacheConfig, HybridCache, HybridCacheError,
    keys::{is_memoizable, response_key},
    stats::METRIC_RESPONSE_BYPASS,
};
use crate::application::error::HttpError;

/// Content type of every memoized response, whatever the handler declared.
pub const CACHED_CONTENT_TYPE: &str = "application/json";

const SOURCE: &str = "cache::middleware";

/// Shared state for [`response_cache_layer`].
#[derive(Clone)]
pub struct ResponseCacheState {
    pub config: CacheConfig,
    pub cache: HybridCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UncacheableReason {
    Status,
    TooLarge,
    NotUtf8,
}

impl fmt::Display for UncacheableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UncacheableReason::Status => "non-success status",
            UncacheableReason::TooLarge => "body exceeds size limit",
            UncacheableReason::NotUtf8 => "body is not valid UTF-8",
        })
    }
}

/// Why a downstream response was not turned into a cache entry.
#[derive(Debug, Error)]
pub enum ResponseCaptureError {
    /// The response was read in full but must not be cached; it is replayed as-is.
    #[error("downstream response is not cacheable ({reason}, status {status})")]
    Uncacheable {
        reason: UncacheableReason,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    #[error("failed to read downstream response body: {0}")]
    Body(String),
}

/// Middleware that memoizes GET responses.
///
/// On a miss the rest of the pipeline runs once per key, even under
/// concurrent requests; its body is captured and cached when the status is
/// 2xx, the body is UTF-8 and within `max_body_bytes`. Anything else is
/// replayed unchanged and not cached.
///
/// `max_body_bytes` bounds what is cached, not what is buffered: the
/// downstream body is always collected in full so it can be replayed to every
/// coalesced waiter, and an oversized body is held in memory until the last
/// of them has responded.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(state): State<ResponseCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.enabled {
        counter!(METRIC_RESPONSE_BYPASS, "reason" => "disabled").increment(1);
        return next.run(request).await;
    }

    if !is_memoizable(request.method()) {
        counter!(METRIC_RESPONSE_BYPASS, "reason" => "method").increment(1);
        return next.run(request).await;
    }

    let key = response_key(request.uri());
    let limit = state.config.max_body_bytes;

    let body = state
        .cache
        .get_or_create(
            &key,
            move || capture_body(next, request, limit),
            state.config.response_ttl,
        )
        .await;

    match body {
        Ok(body) => json_response(body),
        Err(err) => failure_response(&err),
    }
}

async fn capture_body(
    next: Next,
    request: Request<Body>,
    limit: usize,
) -> Result<String, ResponseCaptureError> {
    let (parts, body) = next.run(request).await.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|err| ResponseCaptureError::Body(err.to_string()))?;

    let reason = if !parts.status.is_success() {
        Some(UncacheableReason::Status)
    } else if bytes.len() > limit {
        Some(UncacheableReason::TooLarge)
    } else {
        None
    };

    if let Some(reason) = reason {
        return Err(ResponseCaptureError::Uncacheable {
            reason,
            status: parts.status,
            headers: parts.headers,
            body: bytes,
        });
    }

    String::from_utf8(bytes.to_vec()).map_err(|_| ResponseCaptureError::Uncacheable {
        reason: UncacheableReason::NotUtf8,
        status: parts.status,
        headers: parts.headers,
        body: bytes,
    })
}

fn json_response(body: String) -> Response {
    (
        [(CONTENT_TYPE, HeaderValue::from_static(CACHED_CONTENT_TYPE))],
        body,
    )
        .into_response()
}

fn failure_response(err: &HybridCacheError) -> Response {
    let capture = err
        .factory_error()
        .and_then(|source| source.downcast_ref::<ResponseCaptureError>());

    match capture {
        Some(ResponseCaptureError::Uncacheable {
            reason,
            status,
            headers,
            body,
        }) => {
            debug!(%reason, status = status.as_u16(), "replaying uncacheable response");
            replay(*status, headers, body)
        }
        Some(capture @ ResponseCaptureError::Body(_)) => HttpError::from_error(
            SOURCE,
            StatusCode::BAD_GATEWAY,
            "Bad gateway",
            capture,
        )
        .into_response(),
        None => HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            err,
        )
        .into_response(),
    }
}

fn replay(status: StatusCode, headers: &HeaderMap, body: &Bytes) -> Response {
    let mut response = Response::new(Body::from(body.clone()));
    *response.status_mut() = status;

    let target = response.headers_mut();
    for (name, value) in headers {
        if name != CONTENT_LENGTH {
            target.append(name.clone(), value.clone());
        }
    }

    response
}
