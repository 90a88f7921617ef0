//! Complete status view over every known operation
//!
//! The catalog's service groups define the universe of operations. Stored
//! entries contribute their real freshness; every other operation gets a
//! placeholder row, so consumers always see one row per known operation.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::cache::OperationCacheStatus;
use crate::catalog::Catalog;
use crate::config::CacheConfig;

/// One row of the status view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOperationStatus {
    pub operation_name: String,
    pub is_cached: bool,
    pub is_stale: bool,
    #[serde(serialize_with = "as_millis")]
    pub age: Duration,
    #[serde(serialize_with = "as_millis")]
    pub ttl: Duration,
}

/// Status of the whole cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatusReport {
    pub enabled: bool,
    pub data: Vec<CacheOperationStatus>,
}

impl CacheStatusReport {
    pub fn row(&self, operation: &str) -> Option<&CacheOperationStatus> {
        self.data.iter().find(|row| row.operation_name == operation)
    }

    pub fn cached_count(&self) -> usize {
        self.data.iter().filter(|row| row.is_cached).count()
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Merges actual entry statuses with the catalog's operation universe
pub fn build_status(
    actual: &[OperationCacheStatus],
    enabled: bool,
    config: &CacheConfig,
    catalog: &Catalog,
) -> CacheStatusReport {
    let data = catalog
        .grouped_operations()
        .into_iter()
        .map(|operation| {
            match actual.iter().find(|status| status.operation_name == operation) {
                Some(status) => CacheOperationStatus {
                    operation_name: operation.to_string(),
                    is_cached: status.exists && !status.is_expired,
                    is_stale: status.is_expired,
                    age: status.age,
                    ttl: status.ttl,
                },
                None => CacheOperationStatus {
                    operation_name: operation.to_string(),
                    is_cached: false,
                    is_stale: false,
                    age: Duration::ZERO,
                    ttl: config
                        .explicit_ttl(operation)
                        .unwrap_or(config.default_ttl),
                },
            }
        })
        .collect();

    CacheStatusReport { enabled, data }
}
