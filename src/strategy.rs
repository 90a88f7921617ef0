//! Per-operation refresh/clear behavior
//!
//! Every operation name resolves to a `Strategy`. Operations with a known
//! fetch path get a `QueryStrategy`, which can proactively refetch and which
//! also clears any domain service that privately caches the same data.
//! Everything else falls back to `DefaultStrategy`: clearing evicts the
//! generic entry, refreshing only logs a warning.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::catalog::{Catalog, Service};
use crate::client::QueryClient;
use crate::domain::DomainCache;
use crate::error::{CacheError, Result};

/// Refresh and clear behavior bound to an operation
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Refetches the operation and stores the result
    async fn refresh(&self) -> Result<()>;

    /// Drops every cached copy of the operation
    fn clear(&self);
}

/// Fallback for operations without a registered strategy
pub struct DefaultStrategy {
    operation: String,
    /// `None` when the operation is not in the catalog
    service: Option<Service>,
    cache: TtlCache,
}

impl DefaultStrategy {
    pub fn new(operation: impl Into<String>, service: Option<Service>, cache: TtlCache) -> Self {
        Self {
            operation: operation.into(),
            service,
            cache,
        }
    }
}

#[async_trait]
impl Strategy for DefaultStrategy {
    async fn refresh(&self) -> Result<()> {
        warn!(
            operation = %self.operation,
            "No refresh strategy registered, operation cannot refresh itself"
        );
        Ok(())
    }

    fn clear(&self) {
        match self.service {
            Some(service) => self.cache.evict(service, &self.operation),
            None => {
                for service in Service::ALL {
                    self.cache.evict(service, &self.operation);
                }
            }
        }
    }
}

/// Strategy for operations fetched with a parameterless query document
pub struct QueryStrategy {
    operation: &'static str,
    service: Service,
    document: &'static str,
    cache: TtlCache,
    client: Arc<dyn QueryClient>,
    owner: Option<Arc<dyn DomainCache>>,
}

impl QueryStrategy {
    pub fn new(
        operation: &'static str,
        service: Service,
        document: &'static str,
        cache: TtlCache,
        client: Arc<dyn QueryClient>,
    ) -> Self {
        Self {
            operation,
            service,
            document,
            cache,
            client,
            owner: None,
        }
    }

    /// Also invalidate `owner`'s private copy on refresh and clear
    pub fn owned_by(mut self, owner: Arc<dyn DomainCache>) -> Self {
        self.owner = Some(owner);
        self
    }

    fn invalidate_owner(&self) {
        if let Some(owner) = &self.owner {
            debug!(operation = self.operation, owner = owner.name(), "Invalidating domain cache");
            owner.invalidate(self.operation);
        }
    }
}

#[async_trait]
impl Strategy for QueryStrategy {
    /// Existing data stays in place until the fetch has succeeded
    async fn refresh(&self) -> Result<()> {
        let data = self
            .client
            .execute(self.operation, self.document, json!({}))
            .await
            .map_err(|source| CacheError::Transport {
                operation: self.operation.to_string(),
                source,
            })?;

        self.invalidate_owner();
        self.cache.put(self.service, self.operation, &data);
        debug!(operation = self.operation, service = %self.service, "Refreshed operation");
        Ok(())
    }

    fn clear(&self) {
        self.cache.evict(self.service, self.operation);
        self.invalidate_owner();
    }
}

/// Exact-match lookup table from operation name to strategy
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn Strategy>>,
    services: HashMap<&'static str, Service>,
    cache: TtlCache,
}

impl StrategyRegistry {
    /// Empty registry; every name resolves to the default strategy
    pub fn new(catalog: &Catalog, cache: TtlCache) -> Self {
        let services = catalog
            .operations()
            .iter()
            .map(|op| (op.name, op.service))
            .collect();
        Self {
            strategies: HashMap::new(),
            services,
            cache,
        }
    }

    /// Registers a `QueryStrategy` for every catalog operation with a document
    ///
    /// `owners` lists domain services and the operations whose private copies
    /// they hold.
    pub fn from_catalog(
        catalog: &Catalog,
        cache: TtlCache,
        client: Arc<dyn QueryClient>,
        owners: &[(&[&str], Arc<dyn DomainCache>)],
    ) -> Self {
        let mut registry = Self::new(catalog, cache.clone());
        for op in catalog.operations() {
            let Some(document) = op.document else {
                continue;
            };
            let mut strategy =
                QueryStrategy::new(op.name, op.service, document, cache.clone(), client.clone());
            if let Some((_, owner)) = owners.iter().find(|(ops, _)| ops.contains(&op.name)) {
                strategy = strategy.owned_by(owner.clone());
            }
            registry.register(op.name, Arc::new(strategy));
        }
        registry
    }

    pub fn register(&mut self, operation: impl Into<String>, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(operation.into(), strategy);
    }

    pub fn is_registered(&self, operation: &str) -> bool {
        self.strategies.contains_key(operation)
    }

    /// Registered strategy for `operation`, or the default fallback
    pub fn resolve(&self, operation: &str) -> Arc<dyn Strategy> {
        match self.strategies.get(operation) {
            Some(strategy) => strategy.clone(),
            None => Arc::new(DefaultStrategy::new(
                operation,
                self.services.get(operation).copied(),
                self.cache.clone(),
            )),
        }
    }
}
