//! Durable TTL cache for operation results
//!
//! Entries are stored in a synchronous key-value substrate under
//! `{prefix}-{service}-{operation}` and judged fresh or stale against the
//! TTL currently configured for the operation. Corrupt entries behave like
//! misses and are removed on sight.

mod entry;
mod manager;

pub use entry::{CacheEntry, OperationCacheStatus};
pub use manager::TtlCache;
