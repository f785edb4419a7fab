use std::{error::Error as StdError, sync::Arc};

use thiserror::Error;

/// Error type produced by value factories once erased.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared handle to a factory error so every singleflight waiter can observe it.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Failure reported by a backing store adapter.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Error)]
pub enum HybridCacheError {
    #[error("cache key must not be empty")]
    InvalidKey,
    #[error("cache ttl must be greater than zero")]
    InvalidTtl,
    #[error("failed to {operation} cached value for `{key}`: {message}")]
    Serialization {
        key: String,
        operation: &'static str,
        message: String,
    },
    #[error("shared store error for `{key}`: {source}")]
    BackingStore {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("value factory failed for `{key}`: {source}")]
    Factory {
        key: String,
        #[source]
        source: SharedError,
    },
    #[error("population of `{key}` was aborted: {reason}")]
    Aborted { key: String, reason: String },
}

impl HybridCacheError {
    pub(crate) fn serialize(key: &str, error: serde_json::Error) -> Self {
        Self::Serialization {
            key: key.to_string(),
            operation: "serialize",
            message: error.to_string(),
        }
    }

    pub(crate) fn deserialize(key: &str, message: impl Into<String>) -> Self {
        Self::Serialization {
            key: key.to_string(),
            operation: "deserialize",
            message: message.into(),
        }
    }

    pub(crate) fn shared_store(key: &str, source: StoreError) -> Self {
        Self::BackingStore {
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn factory(key: &str, source: BoxError) -> Self {
        Self::Factory {
            key: key.to_string(),
            source: Arc::from(source),
        }
    }

    /// The error returned by the value factory, if that is what failed.
    pub fn factory_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Factory { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
