//! Request forwarding over the supervised link

use crate::core::protocol::JsonRpcRequest;
use crate::core::supervisor::{ConnectionSupervisor, LinkHandle};
use crate::utils::errors::{McpError, McpResult};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// An inbound operation to relay to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Invoke a named backend tool; sent as `tools/call`
    CallTool {
        name: String,
        arguments: Map<String, Value>,
    },
    /// Any other JSON-RPC method, passed through as-is
    Message {
        method: String,
        params: Option<Value>,
    },
}

impl Operation {
    pub fn call_tool(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Operation::CallTool {
            name: name.into(),
            arguments,
        }
    }

    pub fn message(method: impl Into<String>, params: Option<Value>) -> Self {
        Operation::Message {
            method: method.into(),
            params,
        }
    }

    fn label(&self) -> &str {
        match self {
            Operation::CallTool { name, .. } => name,
            Operation::Message { method, .. } => method,
        }
    }
}

/// Sends operations over the supervisor's link, recovering from a dead
/// link with one reconnect and one retry per call
#[derive(Clone)]
pub struct RequestForwarder {
    supervisor: ConnectionSupervisor,
    call_timeout: Duration,
}

impl RequestForwarder {
    pub fn new(supervisor: ConnectionSupervisor, call_timeout: Duration) -> Self {
        Self {
            supervisor,
            call_timeout,
        }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Forward `operation`, failing fast with [`McpError::NotReady`] when no
    /// link is up.
    ///
    /// A connection fault marks the link dead and hands reconnection to the
    /// supervisor. If that brings a link back, the operation is retried
    /// exactly once; any other outcome returns the original error.
    pub async fn forward(&self, operation: &Operation) -> McpResult<Value> {
        let handle = self.supervisor.current_link().ok_or(McpError::NotReady)?;

        let error = match self.dispatch(&handle, operation).await {
            Err(e) if e.is_connection_fault() => e,
            other => return other,
        };

        warn!(
            generation = handle.generation,
            "Connection fault while forwarding {}: {}",
            operation.label(),
            error
        );
        self.supervisor
            .mark_disconnected(handle.generation, &error.to_string());

        if !self.supervisor.initialize().await {
            debug!("Reconnection did not complete, giving up on {}", operation.label());
            return Err(error);
        }

        let Some(handle) = self.supervisor.current_link() else {
            return Err(error);
        };

        info!(
            generation = handle.generation,
            "Retrying {} after reconnection",
            operation.label()
        );
        self.dispatch(&handle, operation).await
    }

    async fn dispatch(&self, handle: &LinkHandle, operation: &Operation) -> McpResult<Value> {
        match operation {
            Operation::CallTool { name, arguments } => {
                debug!("Calling tool {} on generation {}", name, handle.generation);
                handle
                    .link
                    .invoke(name, arguments.clone(), self.call_timeout)
                    .await
            }
            Operation::Message { method, params } => {
                let request = JsonRpcRequest::new(method.clone(), params.clone());
                handle.link.send(request).await?.into_result()
            }
        }
    }
}
