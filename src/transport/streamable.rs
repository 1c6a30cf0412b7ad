//! Streamable HTTP transport for MCP communication
//!
//! Every JSON-RPC message is POSTed to the backend endpoint. The server
//! answers either with a plain `application/json` body or with a
//! `text/event-stream` body whose `data:` events carry JSON-RPC messages;
//! the first response whose id matches the request completes the call.
//! The session id handed out during `initialize` is echoed on every
//! following request in the `mcp-session-id` header.

use crate::core::protocol::{Implementation, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::transport::traits::{Link, LinkFactory};
use crate::utils::errors::{McpError, McpResult};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// Timeouts applied by the streamable transport
#[derive(Debug, Clone)]
pub struct StreamableHttpOptions {
    /// Bound on TCP connect plus the `initialize` handshake
    pub connect_timeout: Duration,
    /// Default wait for generic requests sent through [`Link::send`]
    pub request_timeout: Duration,
}

impl Default for StreamableHttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Streamable HTTP client link to one MCP server
pub struct StreamableHttpTransport {
    endpoint: Url,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    is_connected: RwLock<bool>,
    options: StreamableHttpOptions,
}

impl StreamableHttpTransport {
    /// Connect to `endpoint` and run the MCP handshake
    pub async fn connect(
        endpoint: Url,
        client_info: Implementation,
        options: StreamableHttpOptions,
    ) -> McpResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| McpError::TransportError(e.to_string()))?;

        let transport = Self {
            endpoint,
            client,
            session_id: RwLock::new(None),
            is_connected: RwLock::new(false),
            options,
        };

        let connect_timeout = transport.options.connect_timeout;
        match tokio::time::timeout(connect_timeout, transport.handshake(client_info)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(McpError::ConnectionError(format!(
                    "handshake with {} timed out after {}ms",
                    transport.endpoint,
                    connect_timeout.as_millis()
                )))
            }
        }

        Ok(transport)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn handshake(&self, client_info: Implementation) -> McpResult<()> {
        info!("Initializing Streamable HTTP transport: {}", self.endpoint);

        let request = JsonRpcRequest::initialize(client_info);
        let request_id = request
            .id
            .clone()
            .ok_or_else(|| McpError::InvalidRequest("Missing request id".to_string()))?;

        let response = self.post(&request).await.map_err(into_connect_error)?;

        if let Some(session_id) = response.headers().get(SESSION_HEADER) {
            if let Ok(id) = session_id.to_str() {
                *self.session_id.write().await = Some(id.to_string());
                info!("Streamable HTTP session established: {}", id);
            }
        }

        let reply = read_response(response, &request_id)
            .await
            .map_err(into_connect_error)?;
        if let Some(error) = reply.error {
            return Err(McpError::ConnectionError(format!(
                "handshake rejected: {} ({})",
                error.message, error.code
            )));
        }

        *self.is_connected.write().await = true;

        let initialized = JsonRpcRequest::notification("notifications/initialized", None);
        self.post(&initialized).await.map_err(into_connect_error)?;

        info!("Streamable HTTP transport initialized");
        Ok(())
    }

    async fn post(&self, request: &JsonRpcRequest) -> McpResult<reqwest::Response> {
        let json = serde_json::to_string(request)?;
        debug!("Sending streamable message: {}", json);

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_BOTH)
            .body(json);

        if let Some(id) = self.session_id.read().await.as_deref() {
            builder = builder.header(SESSION_HEADER, id);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_request() {
                McpError::ConnectionError(format!("Failed to reach {}: {}", self.endpoint, e))
            } else {
                McpError::TransportError(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && self.session_id.read().await.is_some() {
            *self.is_connected.write().await = false;
            return Err(McpError::ConnectionError(
                "session not found on server".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(McpError::TransportError(format!("HTTP error: {}", status)));
        }

        Ok(response)
    }

    async fn exchange(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> McpResult<JsonRpcResponse> {
        if !self.is_connected().await {
            return Err(McpError::TransportError("Transport not connected".to_string()));
        }

        let request_id = request
            .id
            .clone()
            .ok_or_else(|| McpError::InvalidRequest("Missing request id".to_string()))?;

        let call = async {
            let response = self.post(&request).await?;
            read_response(response, &request_id).await
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout(timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl Link for StreamableHttpTransport {
    async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> McpResult<Value> {
        let request = JsonRpcRequest::call_tool(name, arguments);
        self.exchange(request, timeout).await?.into_result()
    }

    async fn send(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if request.is_notification() {
            if !self.is_connected().await {
                return Err(McpError::TransportError("Transport not connected".to_string()));
            }
            self.post(&request).await?;
            return Ok(JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: None,
                result: None,
                error: None,
            });
        }

        self.exchange(request, self.options.request_timeout).await
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    async fn close(&self) -> McpResult<()> {
        {
            let mut connected = self.is_connected.write().await;
            if !*connected {
                return Ok(());
            }
            *connected = false;
        }

        info!("Closing Streamable HTTP transport");

        let session_id = self.session_id.write().await.take();
        if let Some(id) = session_id {
            if let Err(e) = self
                .client
                .delete(self.endpoint.clone())
                .header(SESSION_HEADER, id)
                .send()
                .await
            {
                debug!("Session termination request failed: {}", e);
            }
        }

        Ok(())
    }
}

/// Read the reply for `request_id` from either a JSON or an SSE body
async fn read_response(
    response: reqwest::Response,
    request_id: &RequestId,
) -> McpResult<JsonRpcResponse> {
    let is_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/event-stream"))
        .unwrap_or(false);

    if is_stream {
        return read_event_stream(response, request_id).await;
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| McpError::TransportError(format!("Invalid response body: {}", e)))?;

    match_response(body, request_id).ok_or_else(|| {
        McpError::TransportError(format!("No response for request {:?}", request_id))
    })
}

async fn read_event_stream(
    response: reqwest::Response,
    request_id: &RequestId,
) -> McpResult<JsonRpcResponse> {
    let stream = response.bytes_stream();
    let reader = tokio_util::io::StreamReader::new(stream.map(|result| {
        result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }));

    let mut lines = BufReader::new(reader).lines();
    let mut data = String::new();

    loop {
        let line = lines.next_line().await.map_err(|e| {
            McpError::ConnectionError(format!("Event stream interrupted: {}", e))
        })?;

        let Some(line) = line else {
            break;
        };

        if let Some(payload) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(payload.trim_start());
            continue;
        }

        if !line.trim().is_empty() {
            // event:, id:, retry: and comment lines carry nothing we need
            continue;
        }

        if let Some(reply) = take_event(&mut data, request_id) {
            return Ok(reply);
        }
    }

    if let Some(reply) = take_event(&mut data, request_id) {
        return Ok(reply);
    }

    Err(McpError::TransportError(
        "Connection closed before a response arrived".to_string(),
    ))
}

fn take_event(data: &mut String, request_id: &RequestId) -> Option<JsonRpcResponse> {
    if data.is_empty() {
        return None;
    }

    let event = std::mem::take(data);
    match serde_json::from_str::<Value>(&event) {
        Ok(value) => match_response(value, request_id),
        Err(e) => {
            warn!("Failed to parse streamable event: {}", e);
            None
        }
    }
}

/// Pick the response for `request_id` out of a single message or a batch
fn match_response(value: Value, request_id: &RequestId) -> Option<JsonRpcResponse> {
    let candidates = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    for candidate in candidates {
        // Server-initiated requests and notifications carry a method
        if candidate.get("method").is_some() {
            debug!("Ignoring server message: {}", candidate);
            continue;
        }
        match serde_json::from_value::<JsonRpcResponse>(candidate) {
            Ok(response) if response.id.as_ref() == Some(request_id) => return Some(response),
            Ok(response) => {
                debug!("Received streamable response with unknown id: {:?}", response.id)
            }
            Err(e) => warn!("Failed to parse streamable response: {}", e),
        }
    }

    None
}

/// Failures while opening are connectivity failures regardless of cause
fn into_connect_error(e: McpError) -> McpError {
    match e {
        McpError::ConnectionError(_) => e,
        other => McpError::ConnectionError(format!("handshake failed: {}", other)),
    }
}

/// Opens [`StreamableHttpTransport`] links
pub struct StreamableHttpFactory {
    client_info: Implementation,
    options: StreamableHttpOptions,
}

impl StreamableHttpFactory {
    pub fn new(client_info: Implementation, options: StreamableHttpOptions) -> Self {
        Self {
            client_info,
            options,
        }
    }
}

#[async_trait]
impl LinkFactory for StreamableHttpFactory {
    async fn open(&self, endpoint: &Url) -> McpResult<Arc<dyn Link>> {
        let transport = StreamableHttpTransport::connect(
            endpoint.clone(),
            self.client_info.clone(),
            self.options.clone(),
        )
        .await?;
        Ok(Arc::new(transport))
    }
}
