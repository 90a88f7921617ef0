//! Error types for the operation cache
//!
//! Storage and configuration failures are normally swallowed and logged at the
//! cache boundary; these types exist so the layers below can still report
//! them, and so caller mistakes (unknown operation or group) stay visible.

use thiserror::Error;

/// Errors raised by a durable key-value substrate
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing medium failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The key cannot be represented by this substrate
    #[error("Invalid storage key: '{0}'")]
    InvalidKey(String),

    /// The substrate refused the write (quota, read-only, ...)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the query-execution client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The server answered with query errors
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The catalog has no query document for the operation
    #[error("No query document for '{0}'")]
    MissingDocument(String),

    /// The response carried no `data` member
    #[error("Response for '{0}' contained no data")]
    MissingData(String),
}

/// Errors surfaced by the cache manager
#[derive(Debug, Error)]
pub enum CacheError {
    /// The operation name is not part of the catalog
    #[error("Unknown operation: '{0}'")]
    UnknownOperation(String),

    /// The service group name is not part of the catalog
    #[error("Unknown service group: '{0}'")]
    UnknownGroup(String),

    /// The remote fetch for an operation failed
    #[error("Refresh of '{operation}' failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: ClientError,
    },

    /// Substrate failure that could not be absorbed
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Failed to serialize or parse a stored value
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, CacheError>;
