use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub backend: BackendConfig,
    #[serde(default)]
    #[validate(nested)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listen address of the HTTP front door
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 12307,
        }
    }
}

/// Backend MCP server reached over streamable HTTP
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    #[validate(url)]
    pub url: String,
    /// Name of the backend tool behind `POST /tools/get-cookie`
    #[validate(length(min = 1))]
    pub cookie_tool: String,
    /// Client name announced in the `initialize` handshake
    pub client_name: String,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:12306/mcp".to_string(),
            cookie_tool: "get_cookie".to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Reconnection and health-check policy
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    #[validate(range(max = 100))]
    pub max_reconnect_attempts: u32,
    #[validate(range(min = 1))]
    pub reconnect_delay_ms: u64,
    #[validate(range(min = 1))]
    pub health_check_interval_secs: u64,
    #[validate(range(min = 1))]
    pub health_check_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 2000,
            health_check_interval_secs: 30,
            health_check_timeout_secs: 5,
        }
    }
}

impl SupervisorConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
