//! TTL cache over a durable key-value substrate
//!
//! Provides `TtlCache`, which stores operation results keyed by
//! `(service, operation)` and consults the `ConfigStore` on every call for
//! the TTL and the master switch. Storage failures are logged and treated as
//! misses or no-ops; caching must never block the feature it accelerates.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::entry::{is_expired, CacheEntry, OperationCacheStatus};
use crate::catalog::Service;
use crate::client::NormalizedCache;
use crate::clock::Clock;
use crate::config::{ConfigStore, CONFIG_KEY};
use crate::store::KeyValueStore;

/// Stores and serves timestamped operation results
///
/// All mutation of cache entries in the substrate goes through this type.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn KeyValueStore>,
    config: ConfigStore,
    clock: Arc<dyn Clock>,
    /// Client-side normalized cache kept in step with evictions
    normalized: Option<Arc<dyn NormalizedCache>>,
}

impl TtlCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: ConfigStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
            normalized: None,
        }
    }

    /// Attaches the client cache that evictions are forwarded to
    pub fn with_normalized_cache(mut self, normalized: Arc<dyn NormalizedCache>) -> Self {
        self.normalized = Some(normalized);
        self
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Clock that entry ages are measured against
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Composite storage key for an operation
    pub fn key(prefix: &str, service: Service, operation: &str) -> String {
        format!("{}-{}-{}", prefix, service, operation)
    }

    /// Stores `data` for the operation unless its TTL is zero or caching is off
    pub fn put<T: Serialize>(&self, service: Service, operation: &str, data: &T) {
        let config = self.config.get();
        if !config.enable_caching {
            debug!(%service, operation, "Caching disabled, not storing");
            return;
        }
        let ttl = config.ttl_for(operation);
        if ttl.is_zero() {
            debug!(%service, operation, "Operation is never cached, not storing");
            return;
        }

        let entry = CacheEntry {
            data,
            timestamp: self.clock.now(),
            ttl: Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
        };
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!(%service, operation, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        let key = Self::key(&config.storage_prefix, service, operation);
        match self.store.set(&key, &json) {
            Ok(()) => debug!(%service, operation, "Stored cache entry"),
            Err(e) => warn!(%service, operation, error = %e, "Failed to store cache entry"),
        }
    }

    /// Returns the stored data if present and fresh
    ///
    /// Expired and corrupt entries are removed as a side effect.
    pub fn get<T: DeserializeOwned>(&self, service: Service, operation: &str) -> Option<T> {
        let config = self.config.get();
        if !config.enable_caching {
            return None;
        }
        let key = Self::key(&config.storage_prefix, service, operation);
        let entry = self.read_entry(&key)?;

        let ttl = config.ttl_for(operation);
        let age = entry.age(self.clock.now());
        if ttl.is_zero() || is_expired(age, ttl) {
            debug!(%service, operation, age_ms = age.as_millis() as u64, "Cache entry expired");
            self.remove_key(&key);
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => {
                debug!(%service, operation, "Cache hit");
                Some(data)
            }
            Err(e) => {
                warn!(%service, operation, error = %e, "Cached data has unexpected shape");
                None
            }
        }
    }

    /// Freshness of the operation's entry
    ///
    /// Expired entries are reported, not removed. Corrupt entries are removed
    /// and reported missing, as is everything while caching is disabled.
    pub fn status(&self, service: Service, operation: &str) -> OperationCacheStatus {
        let config = self.config.get();
        let ttl = config.ttl_for(operation);
        if !config.enable_caching {
            return OperationCacheStatus::missing(operation, ttl);
        }

        let key = Self::key(&config.storage_prefix, service, operation);
        match self.read_entry(&key) {
            Some(entry) => OperationCacheStatus::present(operation, entry.age(self.clock.now()), ttl),
            None => OperationCacheStatus::missing(operation, ttl),
        }
    }

    /// Removes one operation's entry
    pub fn evict(&self, service: Service, operation: &str) {
        let prefix = self.config.get().storage_prefix;
        self.remove_key(&Self::key(&prefix, service, operation));
        if let Some(normalized) = &self.normalized {
            normalized.evict(operation);
            normalized.gc();
        }
        debug!(%service, operation, "Evicted cache entry");
    }

    /// Removes every entry belonging to `service`, returning how many
    pub fn evict_service(&self, service: Service) -> usize {
        let prefix = format!("{}-{}-", self.config.get().storage_prefix, service);
        let removed = self.remove_prefixed(&prefix);
        if let Some(normalized) = &self.normalized {
            for key in &removed {
                normalized.evict(&key[prefix.len()..]);
            }
            normalized.gc();
        }
        debug!(%service, count = removed.len(), "Evicted service cache entries");
        removed.len()
    }

    /// Removes every cache entry under the configured prefix
    pub fn evict_all(&self) -> usize {
        let prefix = format!("{}-", self.config.get().storage_prefix);
        let removed = self.remove_prefixed(&prefix);
        if let Some(normalized) = &self.normalized {
            normalized.reset_all();
        }
        debug!(count = removed.len(), "Evicted all cache entries");
        removed.len()
    }

    /// Parses the entry under `key`, dropping it if it is corrupt
    fn read_entry(&self, key: &str) -> Option<CacheEntry<Value>> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache entry");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "Removing corrupt cache entry");
                self.remove_key(key);
                None
            }
        }
    }

    fn remove_key(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!(key, error = %e, "Failed to remove cache entry");
        }
    }

    /// Removes every entry whose key starts with `prefix`
    ///
    /// The config record is never a cache entry, even when the configured
    /// storage prefix happens to match its key.
    fn remove_prefixed(&self, prefix: &str) -> Vec<String> {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix, error = %e, "Failed to list cache entries");
                return Vec::new();
            }
        };
        keys.into_iter()
            .filter(|key| key.starts_with(prefix) && key != CONFIG_KEY)
            .inspect(|key| self.remove_key(key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use crate::error::StoreError;
    use crate::store::{FileStore, MemoryStore};
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    struct Harness {
        cache: TtlCache,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn create_test_cache() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let config = ConfigStore::new(store.clone());
        let mut defaults = CacheConfig::default();
        defaults
            .operation_ttls
            .insert("A".to_string(), Duration::from_secs(600));
        config.set(&defaults);

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let cache = TtlCache::new(store.clone(), config, clock.clone());
        Harness {
            cache,
            store,
            clock,
        }
    }

    fn entry_keys(store: &MemoryStore) -> Vec<String> {
        store
            .keys()
            .unwrap()
            .into_iter()
            .filter(|key| key != CONFIG_KEY)
            .collect()
    }

    #[derive(Default)]
    struct RecordingNormalized {
        calls: Mutex<Vec<String>>,
    }

    impl NormalizedCache for RecordingNormalized {
        fn reset_all(&self) {
            self.calls.lock().push("reset_all".to_string());
        }
        fn evict(&self, field: &str) {
            self.calls.lock().push(format!("evict:{}", field));
        }
        fn gc(&self) -> usize {
            self.calls.lock().push("gc".to_string());
            0
        }
    }

    #[test]
    fn test_put_then_get_returns_data() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "A", &json!({"x": 1}));

        let data: Value = h.cache.get(Service::Core, "A").expect("Fresh entry");
        assert_eq!(data, json!({"x": 1}));
    }

    #[test]
    fn test_put_uses_composite_key() {
        let h = create_test_cache();
        h.cache.put(Service::Billing, "A", &1);
        assert_eq!(entry_keys(&h.store), vec!["admin-cache-billing-A".to_string()]);
    }

    #[test]
    fn test_entry_expires_after_ttl_and_is_removed() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "A", &json!({"x": 1}));

        h.clock.advance(chrono::Duration::minutes(11));

        assert!(h.cache.get::<Value>(Service::Core, "A").is_none());
        assert!(entry_keys(&h.store).is_empty(), "Expired entry should be deleted");
    }

    #[test]
    fn test_entry_exactly_at_ttl_is_still_valid() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "A", &7);

        h.clock.advance(chrono::Duration::minutes(10));
        assert_eq!(h.cache.get::<i32>(Service::Core, "A"), Some(7));

        h.clock.advance(chrono::Duration::milliseconds(1));
        assert_eq!(h.cache.get::<i32>(Service::Core, "A"), None);
    }

    #[test]
    fn test_zero_ttl_operation_is_never_stored() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "getCurrentUser", &json!({"id": 1}));

        assert!(entry_keys(&h.store).is_empty());
        assert!(h.cache.get::<Value>(Service::Core, "getCurrentUser").is_none());
    }

    #[test]
    fn test_zero_ttl_operation_misses_even_with_stale_record() {
        let h = create_test_cache();
        let key = TtlCache::key("admin-cache", Service::Telemetry, "searchAuditEvents");
        h.store
            .set(&key, r#"{"data": [1], "timestamp": 1772355600000}"#)
            .unwrap();

        assert!(h.cache.get::<Value>(Service::Telemetry, "searchAuditEvents").is_none());
        assert!(h.store.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss_and_removed() {
        let h = create_test_cache();
        let key = TtlCache::key("admin-cache", Service::Core, "A");
        h.store.set(&key, "{definitely not json").unwrap();

        assert!(h.cache.get::<Value>(Service::Core, "A").is_none());
        assert!(h.store.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_status_removes_corrupt_entry() {
        let h = create_test_cache();
        let key = TtlCache::key("admin-cache", Service::Core, "listUsers");
        h.store.set(&key, "{corrupt").unwrap();

        assert!(!h.cache.status(Service::Core, "listUsers").exists);
        assert!(h.store.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_status_reports_missing_while_caching_disabled() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "A", &1);
        h.cache.config().set_caching_enabled(false);

        let status = h.cache.status(Service::Core, "A");
        assert!(!status.exists);
        assert!(h.cache.get::<i32>(Service::Core, "A").is_none());
        assert_eq!(entry_keys(&h.store).len(), 1);
    }

    #[test]
    fn test_shape_mismatch_is_a_miss_but_kept() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "A", &json!("text"));

        assert!(h.cache.get::<TestData>(Service::Core, "A").is_none());
        assert_eq!(entry_keys(&h.store).len(), 1);
    }

    #[test]
    fn test_caching_disabled_skips_store_and_serve() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "A", &1);
        h.cache.config().set_caching_enabled(false);

        assert!(h.cache.get::<i32>(Service::Core, "A").is_none());
        h.cache.put(Service::Core, "listUsers", &1);
        assert_eq!(entry_keys(&h.store).len(), 1);
    }

    #[test]
    fn test_status_reports_age_without_removing() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "A", &1);
        h.clock.advance(chrono::Duration::minutes(11));

        let status = h.cache.status(Service::Core, "A");
        assert!(status.exists);
        assert!(status.is_expired);
        assert_eq!(status.age, Duration::from_secs(660));
        assert_eq!(entry_keys(&h.store).len(), 1);

        let missing = h.cache.status(Service::Core, "listUsers");
        assert!(!missing.exists);
        assert_eq!(missing.ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_evict_service_only_touches_that_service() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "A", &1);
        h.cache.put(Service::Core, "listUsers", &2);
        h.cache.put(Service::Billing, "listInvoices", &3);

        assert_eq!(h.cache.evict_service(Service::Core), 2);
        assert_eq!(
            entry_keys(&h.store),
            vec!["admin-cache-billing-listInvoices".to_string()]
        );
    }

    #[test]
    fn test_evict_all_keeps_config_record() {
        let h = create_test_cache();
        h.cache.put(Service::Core, "A", &1);
        h.cache.put(Service::Telemetry, "getSystemHealth", &2);

        assert_eq!(h.cache.evict_all(), 2);
        assert!(entry_keys(&h.store).is_empty());
        assert!(h.store.get(CONFIG_KEY).unwrap().is_some());
    }

    #[test]
    fn test_evict_all_spares_config_when_prefix_overlaps_its_key() {
        let h = create_test_cache();
        let mut config = h.cache.config().get();
        config.storage_prefix = "operation-cache".to_string();
        config.default_ttl = Duration::from_secs(42);
        h.cache.config().set(&config);
        h.cache.put(Service::Core, "listUsers", &1);

        assert_eq!(h.cache.evict_all(), 1);
        assert!(h.store.get(CONFIG_KEY).unwrap().is_some());
        let kept = h.cache.config().get();
        assert_eq!(kept.storage_prefix, "operation-cache");
        assert_eq!(kept.default_ttl, Duration::from_secs(42));
    }

    #[test]
    fn test_evictions_are_forwarded_to_normalized_cache() {
        let h = create_test_cache();
        let normalized = Arc::new(RecordingNormalized::default());
        let cache = h.cache.clone().with_normalized_cache(normalized.clone());

        cache.put(Service::Core, "A", &1);
        cache.evict(Service::Core, "A");
        cache.put(Service::Billing, "listInvoices", &1);
        cache.evict_service(Service::Billing);
        cache.evict_all();

        assert_eq!(
            *normalized.calls.lock(),
            vec!["evict:A", "gc", "evict:listInvoices", "gc", "reset_all"]
        );
    }

    #[test]
    fn test_evict_missing_entry_is_noop() {
        let h = create_test_cache();
        h.cache.evict(Service::Core, "A");
        h.cache.evict(Service::Core, "A");
        assert!(entry_keys(&h.store).is_empty());
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        fn keys(&self) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    #[test]
    fn test_failing_substrate_degrades_to_misses() {
        let store: Arc<dyn KeyValueStore> = Arc::new(FailingStore);
        let cache = TtlCache::new(
            store.clone(),
            ConfigStore::new(store),
            Arc::new(ManualClock::new(Utc::now())),
        );

        cache.put(Service::Core, "listUsers", &1);
        assert!(cache.get::<i32>(Service::Core, "listUsers").is_none());
        assert_eq!(cache.evict_all(), 0);
        assert!(!cache.status(Service::Core, "listUsers").exists);
    }

    #[test]
    fn test_works_over_file_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store: Arc<dyn KeyValueStore> =
            Arc::new(FileStore::with_dir(temp_dir.path().to_path_buf()));
        let cache = TtlCache::new(
            store.clone(),
            ConfigStore::new(store),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let data = TestData {
            name: "users".to_string(),
            value: 42,
        };

        cache.put(Service::Core, "listUsers", &data);

        assert!(temp_dir.path().join("admin-cache-core-listUsers.json").exists());
        assert_eq!(cache.get::<TestData>(Service::Core, "listUsers"), Some(data));
    }
}
