use crate::core::Operation;
use crate::http_server::server::AppState;
use crate::utils::errors::McpError;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Liveness plus the live connection status of the backend link
pub async fn ping(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.forwarder.supervisor().status();

    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "message": "MCP HTTP relay is running",
        "mcpServerUrl": state.backend_url,
        "mcpClientReady": status.is_connected,
        "connectionStatus": status,
    }))
}

/// Describe the tools exposed over HTTP
pub async fn tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    let ready = state.forwarder.supervisor().is_connected();

    Json(json!({
        "tools": [{
            "name": "get-cookie",
            "description": "Retrieve the cookies the browser holds for a URL",
            "endpoint": "/tools/get-cookie",
            "method": "POST",
            "parameters": {
                "url": {
                    "type": "string",
                    "required": true,
                    "description": "Page URL whose cookies are returned",
                }
            },
            "status": if ready { "ready" } else { "initializing" },
        }]
    }))
}

/// Relay a cookie lookup to the backend tool
pub async fn get_cookie(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid JSON",
                    "details": e.to_string(),
                })),
            )
                .into_response();
        }
    };

    let Some(url) = payload
        .get("url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing required parameter: url" })),
        )
            .into_response();
    };

    if !state.forwarder.supervisor().is_connected() {
        return not_ready(&state);
    }

    info!("Getting cookies for {}", url);

    let mut arguments = Map::new();
    arguments.insert("url".to_string(), Value::String(url.to_string()));
    let operation = Operation::call_tool(state.cookie_tool.clone(), arguments);

    match state.forwarder.forward(&operation).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Cookie retrieved successfully",
                "response": result,
                "request": { "url": url },
            })),
        )
            .into_response(),
        Err(McpError::NotReady) => not_ready(&state),
        // The link died and could not be brought back inside this request
        Err(e) if e.is_connection_fault() && !state.forwarder.supervisor().is_connected() => {
            warn!("MCP link lost while getting cookies for {}: {}", url, e);
            not_ready(&state)
        }
        Err(e) => {
            error!("Error calling MCP tool {}: {}", state.cookie_tool, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to communicate with MCP server",
                    "details": e.to_string(),
                    "suggestion": format!(
                        "Make sure the MCP server is running at {}",
                        state.backend_url
                    ),
                })),
            )
                .into_response()
        }
    }
}

/// Clear the reconnect counter and try to connect now
pub async fn reconnect(State(state): State<Arc<AppState>>) -> Response {
    let supervisor = state.forwarder.supervisor();
    let connected = supervisor.reset().await;
    if !connected {
        warn!("Manual reconnection did not connect");
    }

    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "success": connected,
            "connectionStatus": supervisor.status(),
        })),
    )
        .into_response()
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" }))).into_response()
}

fn not_ready(state: &AppState) -> Response {
    let status = state.forwarder.supervisor().status();
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "MCP client not ready",
            "suggestion": format!(
                "The relay is not connected to {}; retry shortly or POST /reconnect",
                state.backend_url
            ),
            "connectionStatus": status,
        })),
    )
        .into_response()
}
