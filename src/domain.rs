//! Domain services that keep their own private copies of remote data
//!
//! These sit beside the generic TTL cache. Whenever an operation they own is
//! refreshed or cleared, the strategy for it also tells the owning service
//! to drop its copy so the two layers never disagree.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

use crate::catalog::Catalog;
use crate::client::QueryClient;
use crate::error::ClientError;

/// A service holding privately cached results for some operations
pub trait DomainCache: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Drops the private copy for `operation`
    fn invalidate(&self, operation: &str);
}

const LIST_USERS: &str = "listUsers";
const USER_STATS: &str = "getUserStats";

/// User list and statistics, memoized for the lifetime of the session
pub struct UserDirectory {
    client: Arc<dyn QueryClient>,
    /// Query documents for the owned operations, taken from the catalog
    documents: HashMap<&'static str, &'static str>,
    memo: Mutex<HashMap<&'static str, Value>>,
}

impl UserDirectory {
    /// Operations whose private copies this service owns
    pub const OPERATIONS: [&'static str; 2] = [LIST_USERS, USER_STATS];

    /// Creates the directory, looking up its query documents in `catalog`
    pub fn new(client: Arc<dyn QueryClient>, catalog: &Catalog) -> Self {
        let documents = Self::OPERATIONS
            .iter()
            .filter_map(|name| {
                let document = catalog.operation(name)?.document?;
                Some((*name, document))
            })
            .collect();
        Self {
            client,
            documents,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// All users, fetched once per session unless invalidated
    pub async fn list_users(&self) -> Result<Value, ClientError> {
        self.memoized(LIST_USERS).await
    }

    /// User totals, fetched once per session unless invalidated
    pub async fn user_stats(&self) -> Result<Value, ClientError> {
        self.memoized(USER_STATS).await
    }

    /// Whether a private copy of `operation` is held
    pub fn is_memoized(&self, operation: &str) -> bool {
        self.memo.lock().contains_key(operation)
    }

    async fn memoized(&self, operation: &'static str) -> Result<Value, ClientError> {
        if let Some(value) = self.memo.lock().get(operation) {
            return Ok(value.clone());
        }
        let query = self
            .documents
            .get(operation)
            .ok_or_else(|| ClientError::MissingDocument(operation.to_string()))?;
        let data = self.client.execute(operation, query, json!({})).await?;
        self.memo.lock().insert(operation, data.clone());
        Ok(data)
    }
}

impl DomainCache for UserDirectory {
    fn name(&self) -> &str {
        "user-directory"
    }

    fn invalidate(&self, operation: &str) {
        if self.memo.lock().remove(operation).is_some() {
            debug!(operation, "User directory dropped private copy");
        }
    }
}
