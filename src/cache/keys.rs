//! Response cache key derivation.
//!
//! Keys are `"{path}_{query}"` where `query` keeps its leading `?`. Parameters
//! are not reordered or decoded, so `?a=1&b=2` and `?b=2&a=1` are distinct
//! entries, and the format does no escaping.

use axum::http::{Method, Uri};

/// Only GET responses are memoized; the method name is compared case-insensitively.
pub fn is_memoizable(method: &Method) -> bool {
    method.as_str().eq_ignore_ascii_case(Method::GET.as_str())
}

/// Build the cache key for a request URI.
///
/// A bare `?` with nothing after it counts as no query string.
pub fn response_key(uri: &Uri) -> String {
    match uri.query().filter(|query| !query.is_empty()) {
        Some(query) => format!("{}_?{}", uri.path(), query),
        None => format!("{}_", uri.path()),
    }
}
