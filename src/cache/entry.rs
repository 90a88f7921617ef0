use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record stored for one `(service, operation)` key
///
/// Service and operation live in the key, so the record itself only carries
/// the payload, when it was written and the TTL in force at that time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// TTL in milliseconds when the entry was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl<T> CacheEntry<T> {
    /// Age at `now`; clock skew never produces a negative age
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Whether an entry of `age` has outlived `ttl`
///
/// Strictly greater-than: an entry exactly `ttl` old is still valid.
pub(crate) fn is_expired(age: Duration, ttl: Duration) -> bool {
    age > ttl
}

/// Freshness of a single operation's entry, computed on demand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationCacheStatus {
    pub operation_name: String,
    pub exists: bool,
    pub age: Duration,
    pub ttl: Duration,
    pub is_expired: bool,
    /// Time left before the entry turns stale; zero once expired
    pub expires_in: Duration,
}

impl OperationCacheStatus {
    pub(crate) fn missing(operation: &str, ttl: Duration) -> Self {
        Self {
            operation_name: operation.to_string(),
            exists: false,
            age: Duration::ZERO,
            ttl,
            is_expired: false,
            expires_in: Duration::ZERO,
        }
    }

    pub(crate) fn present(operation: &str, age: Duration, ttl: Duration) -> Self {
        let is_expired = ttl.is_zero() || is_expired(age, ttl);
        Self {
            operation_name: operation.to_string(),
            exists: true,
            age,
            ttl,
            is_expired,
            expires_in: if is_expired {
                Duration::ZERO
            } else {
                ttl - age
            },
        }
    }
}
