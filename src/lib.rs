//! Operation-level TTL cache manager
//!
//! A policy-driven cache between dashboard data hooks and the remote
//! query-execution client. Each named operation has its own TTL, can be
//! refreshed or cleared alone or with its service group, and the whole cache
//! can be refreshed automatically at a configured time of day.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod refresh;
pub mod schedule;
pub mod status;
pub mod store;
pub mod strategy;

pub use cache::{CacheEntry, OperationCacheStatus, TtlCache};
pub use catalog::{Catalog, OperationSpec, Service, ServiceGroup};
pub use config::{CacheConfig, ConfigStore, ScheduledRefreshConfig};
pub use error::{CacheError, ClientError, StoreError};
pub use orchestrator::{ActionResult, CacheOrchestrator};
pub use status::{build_status, CacheOperationStatus, CacheStatusReport};
