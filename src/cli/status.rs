//! `status`: ask a running relay how its backend link is doing

use crate::cli::args::StatusArgs;
use crate::core::ConnectionStatus;
use crate::utils::errors::{McpError, McpResult};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub status: String,
    pub timestamp: String,
    pub mcp_server_url: String,
    pub mcp_client_ready: bool,
    pub connection_status: ConnectionStatus,
}

pub async fn fetch(base_url: &str) -> McpResult<PingResponse> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| McpError::TransportError(e.to_string()))?;

    let url = format!("{}/ping", base_url.trim_end_matches('/'));
    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        return Err(McpError::TransportError(format!(
            "{} returned HTTP {}",
            url,
            response.status()
        )));
    }

    response
        .json::<PingResponse>()
        .await
        .map_err(|e| McpError::TransportError(format!("Unexpected /ping body: {}", e)))
}

pub fn render(ping: &PingResponse) -> String {
    let conn = &ping.connection_status;
    let state = if conn.is_connected {
        "connected"
    } else if conn.is_initializing {
        "connecting"
    } else {
        "disconnected"
    };

    format!(
        "Relay:       {} ({})\nMCP server:  {}\nLink:        {}\nReconnects:  {}/{}",
        ping.status,
        ping.timestamp,
        ping.mcp_server_url,
        state,
        conn.reconnect_attempts,
        conn.max_reconnect_attempts
    )
}

pub async fn run(args: StatusArgs) -> anyhow::Result<()> {
    if args.json {
        let body: serde_json::Value = reqwest::get(format!("{}/ping", args.url.trim_end_matches('/')))
            .await?
            .json()
            .await?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let ping = fetch(&args.url).await?;
    println!("{}", render(&ping));

    if !ping.mcp_client_ready {
        anyhow::bail!("relay is up but not connected to {}", ping.mcp_server_url);
    }
    Ok(())
}
