//! Query-execution client
//!
//! The cache manager only needs two things from the remote client: running a
//! query, and the coarse controls over the client's own normalized cache so
//! both layers forget the same operation together.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;

/// Coarse controls over a client-side normalized cache
pub trait NormalizedCache: Send + Sync {
    /// Drops every normalized field
    fn reset_all(&self);

    /// Marks one root field as evicted
    fn evict(&self, field: &str);

    /// Collects evicted fields, returning how many were removed
    fn gc(&self) -> usize;
}

/// Runs queries against the remote back-end
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Executes `query` and returns the response `data` object
    async fn execute(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, ClientError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    operation_name: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<QueryErrorBody>,
}

#[derive(Debug, Deserialize)]
struct QueryErrorBody {
    message: String,
}

/// HTTP client posting `{query, operationName, variables}` documents
#[derive(Debug)]
pub struct HttpQueryClient {
    client: Client,
    endpoint: String,
    /// Root field → last value; `None` marks an evicted field awaiting gc
    fields: Mutex<HashMap<String, Option<Value>>>,
}

impl HttpQueryClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            fields: Mutex::new(HashMap::new()),
        }
    }

    /// Last normalized value for a root field, unless evicted
    pub fn cached_field(&self, field: &str) -> Option<Value> {
        self.fields.lock().get(field).cloned().flatten()
    }

    fn normalize(&self, data: &Value) {
        if let Value::Object(object) = data {
            let mut fields = self.fields.lock();
            for (field, value) in object {
                fields.insert(field.clone(), Some(value.clone()));
            }
        }
    }
}

/// Turns a decoded response into `data`, or the error it reports
fn into_data(operation: &str, response: QueryResponse) -> Result<Value, ClientError> {
    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(ClientError::QueryFailed(messages.join("; ")));
    }
    match response.data {
        Some(Value::Null) | None => Err(ClientError::MissingData(operation.to_string())),
        Some(data) => Ok(data),
    }
}

#[async_trait]
impl QueryClient for HttpQueryClient {
    async fn execute(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, ClientError> {
        let request = QueryRequest {
            query,
            operation_name: operation,
            variables,
        };

        debug!(operation, endpoint = %self.endpoint, "Executing query");
        let response: QueryResponse = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let data = into_data(operation, response)?;
        self.normalize(&data);
        Ok(data)
    }
}

impl NormalizedCache for HttpQueryClient {
    fn reset_all(&self) {
        self.fields.lock().clear();
    }

    fn evict(&self, field: &str) {
        if let Some(slot) = self.fields.lock().get_mut(field) {
            *slot = None;
        }
    }

    fn gc(&self) -> usize {
        let mut fields = self.fields.lock();
        let before = fields.len();
        fields.retain(|_, value| value.is_some());
        before - fields.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(body: Value) -> QueryResponse {
        serde_json::from_value(body).expect("Valid response body")
    }

    #[test]
    fn test_into_data_returns_data_member() {
        let data = into_data("listUsers", response(json!({"data": {"listUsers": []}}))).unwrap();
        assert_eq!(data, json!({"listUsers": []}));
    }

    #[test]
    fn test_into_data_reports_query_errors() {
        let result = into_data(
            "listUsers",
            response(json!({"data": null, "errors": [{"message": "forbidden"}, {"message": "retry"}]})),
        );
        match result {
            Err(ClientError::QueryFailed(message)) => assert_eq!(message, "forbidden; retry"),
            other => panic!("Expected QueryFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_into_data_requires_data() {
        let result = into_data("listUsers", response(json!({})));
        assert!(matches!(result, Err(ClientError::MissingData(op)) if op == "listUsers"));
    }

    #[test]
    fn test_request_uses_camel_case_operation_name() {
        let request = QueryRequest {
            query: "query q { q }",
            operation_name: "q",
            variables: json!({}),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["operationName"], "q");
    }

    #[test]
    fn test_evict_then_gc_forgets_field() {
        let client = HttpQueryClient::new("http://localhost/graphql");
        client.normalize(&json!({"listUsers": [1], "getUserStats": {"total": 3}}));

        client.evict("listUsers");
        assert!(client.cached_field("listUsers").is_none());
        assert_eq!(client.gc(), 1);
        assert_eq!(client.cached_field("getUserStats"), Some(json!({"total": 3})));

        client.reset_all();
        assert!(client.cached_field("getUserStats").is_none());
    }
}
