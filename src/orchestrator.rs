//! Cache orchestration
//!
//! `CacheOrchestrator` is the surface the dashboard talks to. It composes the
//! TTL cache, the strategy registry and the status aggregator into bulk,
//! per-group and per-operation actions. Actions report failures in their
//! `ActionResult` instead of returning an error; only caller mistakes
//! (unknown operation or group) come back as `Err`. Every action finishes by
//! recomputing the status exactly once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::catalog::{Catalog, ServiceGroup};
use crate::client::{NormalizedCache, QueryClient};
use crate::clock::Clock;
use crate::config::ConfigStore;
use crate::domain::{DomainCache, UserDirectory};
use crate::error::{CacheError, Result};
use crate::schedule::{next_occurrence, ScheduledRefreshInfo};
use crate::status::{build_status, CacheStatusReport};
use crate::store::KeyValueStore;
use crate::strategy::StrategyRegistry;

/// Pause after a full refresh before status is recomputed
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Outcome of an orchestrator action
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub error: Option<String>,
    /// Status recomputed after the action
    pub status: CacheStatusReport,
}

/// Composes cache, strategies and status into dashboard actions
pub struct CacheOrchestrator {
    catalog: Catalog,
    cache: TtlCache,
    registry: StrategyRegistry,
    client: Arc<dyn QueryClient>,
    users: Arc<UserDirectory>,
    settle_delay: Duration,
    last_status: RwLock<Option<CacheStatusReport>>,
}

impl CacheOrchestrator {
    /// Builds an orchestrator from parts
    ///
    /// `users` should be registered in `registry` as the owner of
    /// `UserDirectory::OPERATIONS` so refreshes and clears reach its memo.
    pub fn new(
        catalog: Catalog,
        cache: TtlCache,
        registry: StrategyRegistry,
        client: Arc<dyn QueryClient>,
        users: Arc<UserDirectory>,
    ) -> Self {
        Self {
            catalog,
            cache,
            registry,
            client,
            users,
            settle_delay: DEFAULT_SETTLE_DELAY,
            last_status: RwLock::new(None),
        }
    }

    /// Wires the admin dashboard catalog, strategies and domain services
    ///
    /// `client` serves both as the query executor and as the normalized cache
    /// that evictions are forwarded to.
    pub fn assemble<C>(store: Arc<dyn KeyValueStore>, client: Arc<C>, clock: Arc<dyn Clock>) -> Self
    where
        C: QueryClient + NormalizedCache + 'static,
    {
        let catalog = Catalog::admin_dashboard();
        let normalized: Arc<dyn NormalizedCache> = client.clone();
        let client: Arc<dyn QueryClient> = client;
        let cache = TtlCache::new(store.clone(), ConfigStore::new(store), clock)
            .with_normalized_cache(normalized);

        let users = Arc::new(UserDirectory::new(client.clone(), &catalog));
        let owner: Arc<dyn DomainCache> = users.clone();
        let owned: &[&str] = &UserDirectory::OPERATIONS;
        let registry =
            StrategyRegistry::from_catalog(&catalog, cache.clone(), client.clone(), &[(owned, owner)]);

        Self::new(catalog, cache, registry, client, users)
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub fn config(&self) -> &ConfigStore {
        self.cache.config()
    }

    /// Session-memoized user data, invalidated with its operations
    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Serves a fresh entry, or executes the query and stores the result
    pub async fn query(&self, operation: &str, document: &str, variables: Value) -> Result<Value> {
        let op = self
            .catalog
            .operation(operation)
            .ok_or_else(|| CacheError::UnknownOperation(operation.to_string()))?;

        if let Some(data) = self.cache.get::<Value>(op.service, op.name) {
            return Ok(data);
        }

        let data = self
            .client
            .execute(op.name, document, variables)
            .await
            .map_err(|source| CacheError::Transport {
                operation: op.name.to_string(),
                source,
            })?;
        self.cache.put(op.service, op.name, &data);
        Ok(data)
    }

    /// Recomputes the status view in a single pass
    pub fn get_status(&self) -> CacheStatusReport {
        let config = self.config().get();
        let actual: Vec<_> = self
            .catalog
            .operations()
            .iter()
            .map(|op| self.cache.status(op.service, op.name))
            .filter(|status| status.exists)
            .collect();

        let report = build_status(&actual, config.enable_caching, &config, &self.catalog);
        *self.last_status.write() = Some(report.clone());
        report
    }

    /// Status from the most recent recomputation, if any
    pub fn last_status(&self) -> Option<CacheStatusReport> {
        self.last_status.read().clone()
    }

    /// Current local wall-clock time according to the cache's clock
    pub fn local_now(&self) -> NaiveDateTime {
        self.cache.clock().now().with_timezone(&Local).naive_local()
    }

    /// When the next daily refresh will run, if scheduling is enabled
    pub fn scheduled_refresh_info(&self) -> ScheduledRefreshInfo {
        next_occurrence(&self.config().get(), self.local_now())
    }

    /// Clears everything, refetches every group, waits for the client to settle
    pub async fn refresh_all(&self) -> ActionResult {
        info!("Refreshing all cached operations");
        self.cache.evict_all();

        let mut errors = Vec::new();
        for group in self.catalog.groups() {
            errors.extend(self.refresh_group_operations(group).await);
        }

        tokio::time::sleep(self.settle_delay).await;
        self.finish(errors)
    }

    /// Removes every cache entry and every domain service's private copy
    pub async fn clear_all(&self) -> ActionResult {
        info!("Clearing all cached operations");
        self.cache.evict_all();
        for op in self.catalog.operations() {
            self.registry.resolve(op.name).clear();
        }
        self.finish(Vec::new())
    }

    /// Refetches one operation; its previous data survives a failed fetch
    pub async fn refresh_operation(&self, operation: &str) -> Result<ActionResult> {
        self.known_operation(operation)?;
        info!(operation, "Refreshing operation");
        let errors = match self.registry.resolve(operation).refresh().await {
            Ok(()) => Vec::new(),
            Err(e) => vec![e],
        };
        Ok(self.finish(errors))
    }

    /// Clears one operation through its strategy
    ///
    /// # Errors
    /// `UnknownOperation` if `operation` is not in the catalog.
    pub async fn clear_operation(&self, operation: &str) -> Result<ActionResult> {
        self.known_operation(operation)?;
        info!(operation, "Clearing operation");
        self.registry.resolve(operation).clear();
        Ok(self.finish(Vec::new()))
    }

    /// Clears and concurrently refetches every operation of a group
    ///
    /// # Errors
    /// `UnknownGroup` if no group is called `name`.
    pub async fn refresh_group(&self, name: &str) -> Result<ActionResult> {
        let group = self.known_group(name)?;
        info!(group = name, "Refreshing service group");
        let errors = self.refresh_group_operations(group).await;
        Ok(self.finish(errors))
    }

    /// Clears every operation of a group
    ///
    /// # Errors
    /// `UnknownGroup` if no group is called `name`.
    pub async fn clear_group(&self, name: &str) -> Result<ActionResult> {
        let group = self.known_group(name)?;
        info!(group = name, "Clearing service group");
        for operation in &group.operations {
            self.registry.resolve(operation).clear();
        }
        Ok(self.finish(Vec::new()))
    }

    /// Evicts every operation of the group, then refreshes them concurrently
    async fn refresh_group_operations(&self, group: &ServiceGroup) -> Vec<CacheError> {
        let strategies: Vec<_> = group
            .operations
            .iter()
            .map(|operation| self.registry.resolve(operation))
            .collect();
        for strategy in &strategies {
            strategy.clear();
        }

        let results = join_all(strategies.iter().map(|strategy| strategy.refresh())).await;
        debug!(group = group.name, count = results.len(), "Group refresh finished");
        results.into_iter().filter_map(|result| result.err()).collect()
    }

    fn known_operation(&self, operation: &str) -> Result<()> {
        match self.catalog.operation(operation) {
            Some(_) => Ok(()),
            None => Err(CacheError::UnknownOperation(operation.to_string())),
        }
    }

    fn known_group(&self, name: &str) -> Result<&ServiceGroup> {
        self.catalog
            .group(name)
            .ok_or_else(|| CacheError::UnknownGroup(name.to_string()))
    }

    fn finish(&self, errors: Vec<CacheError>) -> ActionResult {
        let status = self.get_status();
        if errors.is_empty() {
            return ActionResult {
                success: true,
                error: None,
                status,
            };
        }

        for error in &errors {
            warn!(error = %error, "Cache action step failed");
        }
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ActionResult {
            success: false,
            error: Some(message),
            status,
        }
    }
}
