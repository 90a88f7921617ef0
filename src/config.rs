//! Persisted cache policy
//!
//! `ConfigStore` owns the single `CacheConfig` record. Nothing keeps a copy
//! of record in memory: every decision reads the store again, and every read
//! merges the persisted JSON over the built-in defaults so that partial or
//! legacy shapes never drop a known operation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::store::KeyValueStore;

/// Well-known key holding the serialized config
pub const CONFIG_KEY: &str = "operation-cache-config";

/// Operations that must never be served from cache (TTL pinned to zero)
pub const NEVER_CACHE_OPERATIONS: &[&str] = &["getCurrentUser", "searchAuditEvents"];

const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_PREFIX: &str = "admin-cache";

/// Daily refresh settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRefreshConfig {
    pub enabled: bool,
    /// Local time of day, `HH:MM`
    pub time: String,
    /// Carried for display only
    pub timezone: String,
}

impl Default for ScheduledRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time: "06:00".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

/// Process-wide caching policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL for operations without an override
    pub default_ttl: Duration,
    /// Master switch; when off nothing is stored or served
    pub enable_caching: bool,
    pub scheduled_refresh: ScheduledRefreshConfig,
    /// Namespace for every cache entry key
    pub storage_prefix: String,
    /// Per-operation overrides; `Duration::ZERO` means bypass the cache
    pub operation_ttls: BTreeMap<String, Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut operation_ttls = BTreeMap::new();
        for operation in NEVER_CACHE_OPERATIONS {
            operation_ttls.insert(operation.to_string(), Duration::ZERO);
        }
        operation_ttls.insert("getSystemHealth".to_string(), Duration::from_secs(5 * 60));
        operation_ttls.insert("getUsageMetrics".to_string(), Duration::from_secs(15 * 60));

        Self {
            default_ttl: DEFAULT_TTL,
            enable_caching: true,
            scheduled_refresh: ScheduledRefreshConfig::default(),
            storage_prefix: DEFAULT_PREFIX.to_string(),
            operation_ttls,
        }
    }
}

impl CacheConfig {
    /// Override if present, else the default TTL
    pub fn ttl_for(&self, operation: &str) -> Duration {
        self.operation_ttls
            .get(operation)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Whether an explicit, non-zero override exists
    pub fn explicit_ttl(&self, operation: &str) -> Option<Duration> {
        self.operation_ttls
            .get(operation)
            .copied()
            .filter(|ttl| !ttl.is_zero())
    }

    fn to_persisted(&self) -> PersistedConfig<'_> {
        PersistedConfig {
            default_ttl: millis(self.default_ttl),
            enable_caching: self.enable_caching,
            scheduled_refresh: &self.scheduled_refresh,
            storage_prefix: &self.storage_prefix,
            operation_ttls: self
                .operation_ttls
                .iter()
                .map(|(operation, ttl)| (operation.as_str(), millis(*ttl)))
                .collect(),
        }
    }

    /// Builds a config from a persisted JSON object, field by field over the defaults
    fn merged_from(object: &Map<String, Value>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = object.get("defaultTTL").and_then(Value::as_u64) {
            config.default_ttl = Duration::from_millis(ms);
        }
        if let Some(enabled) = object.get("enableCaching").and_then(Value::as_bool) {
            config.enable_caching = enabled;
        }
        if let Some(prefix) = object.get("storagePrefix").and_then(Value::as_str) {
            if !prefix.is_empty() {
                config.storage_prefix = prefix.to_string();
            }
        }
        if let Some(Value::Object(scheduled)) = object.get("scheduledRefresh") {
            let target = &mut config.scheduled_refresh;
            if let Some(enabled) = scheduled.get("enabled").and_then(Value::as_bool) {
                target.enabled = enabled;
            }
            if let Some(time) = scheduled.get("time").and_then(Value::as_str) {
                target.time = time.to_string();
            }
            if let Some(timezone) = scheduled.get("timezone").and_then(Value::as_str) {
                target.timezone = timezone.to_string();
            }
        }
        if let Some(raw) = object.get("operationTTLs") {
            for (operation, ttl) in parse_operation_ttls(raw) {
                config.operation_ttls.insert(operation, ttl);
            }
        }

        for operation in NEVER_CACHE_OPERATIONS {
            config
                .operation_ttls
                .insert(operation.to_string(), Duration::ZERO);
        }
        config
    }
}

/// On-disk shape, camelCase with millisecond durations
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedConfig<'a> {
    #[serde(rename = "defaultTTL")]
    default_ttl: u64,
    enable_caching: bool,
    scheduled_refresh: &'a ScheduledRefreshConfig,
    storage_prefix: &'a str,
    #[serde(rename = "operationTTLs")]
    operation_ttls: BTreeMap<&'a str, u64>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Accepts both an object and the legacy string-encoded object
fn parse_operation_ttls(raw: &Value) -> BTreeMap<String, Duration> {
    let parsed;
    let object = match raw {
        Value::Object(object) => object,
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(object)) => {
                parsed = object;
                &parsed
            }
            Ok(_) | Err(_) => {
                warn!("Stored operationTTLs string is not a JSON object, ignoring it");
                return BTreeMap::new();
            }
        },
        _ => return BTreeMap::new(),
    };

    object
        .iter()
        .filter_map(|(operation, ms)| {
            ms.as_u64()
                .map(|ms| (operation.clone(), Duration::from_millis(ms)))
        })
        .collect()
}

/// Reads and writes the persisted `CacheConfig`
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    /// Creates a config store persisting under `CONFIG_KEY` in `store`
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Returns the current config; never fails
    ///
    /// Missing, unreadable or corrupt records yield the built-in defaults.
    pub fn get(&self) -> CacheConfig {
        let raw = match self.store.get(CONFIG_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheConfig::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read cache config, using defaults");
                return CacheConfig::default();
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(object)) => CacheConfig::merged_from(&object),
            Ok(_) => {
                warn!("Stored cache config is not an object, using defaults");
                CacheConfig::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse cache config, using defaults");
                CacheConfig::default()
            }
        }
    }

    /// Persists `config`; failures are logged and otherwise ignored
    pub fn set(&self, config: &CacheConfig) {
        let json = match serde_json::to_string(&config.to_persisted()) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize cache config");
                return;
            }
        };
        if let Err(e) = self.store.set(CONFIG_KEY, &json) {
            warn!(error = %e, "Failed to persist cache config");
        }
    }

    /// TTL in force for `operation`: its override, or the default
    ///
    /// # Returns
    /// `Duration::ZERO` for operations that are never cached.
    pub fn get_ttl(&self, operation: &str) -> Duration {
        self.get().ttl_for(operation)
    }

    /// Sets the TTL override for one operation, in hours
    pub fn set_operation_ttl(&self, operation: &str, hours: f64) {
        let Ok(ttl) = Duration::try_from_secs_f64(hours * 3600.0) else {
            warn!(operation, hours, "Ignoring invalid TTL");
            return;
        };
        let mut config = self.get();
        config.operation_ttls.insert(operation.to_string(), ttl);
        debug!(operation, ttl_ms = millis(ttl), "Updated operation TTL");
        self.set(&config);
    }

    /// Replaces the TTL used by operations without an override
    pub fn set_default_ttl(&self, ttl: Duration) {
        let mut config = self.get();
        config.default_ttl = ttl;
        self.set(&config);
    }

    /// Flips the master switch; disabled caching stores and serves nothing
    pub fn set_caching_enabled(&self, enabled: bool) {
        let mut config = self.get();
        config.enable_caching = enabled;
        self.set(&config);
    }

    pub fn set_scheduled_refresh(&self, scheduled: ScheduledRefreshConfig) {
        let mut config = self.get();
        config.scheduled_refresh = scheduled;
        self.set(&config);
    }

    /// Drops the persisted record so reads return defaults again
    pub fn reset(&self) {
        if let Err(e) = self.store.remove(CONFIG_KEY) {
            warn!(error = %e, "Failed to reset cache config");
        }
    }
}
