use crate::core::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::utils::errors::McpResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// One open logical connection to the backend MCP server
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Link: Send + Sync {
    /// Call a named tool with structured arguments, failing with
    /// `McpError::Timeout` if no response arrives within `timeout`
    async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> McpResult<Value>;

    /// Send a generic request and wait for its response
    async fn send(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse>;

    /// Check if the link still considers itself open
    async fn is_connected(&self) -> bool;

    /// Release the connection. Safe to call more than once.
    async fn close(&self) -> McpResult<()>;
}

/// Opens links to a backend endpoint
#[async_trait]
pub trait LinkFactory: Send + Sync {
    /// Establish a connection and complete the protocol handshake
    async fn open(&self, endpoint: &Url) -> McpResult<Arc<dyn Link>>;
}
