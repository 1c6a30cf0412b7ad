//! Connection lifecycle state shared between the supervisor and its readers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle phase of the backend link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Point-in-time view of the supervisor, serialized into status responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub is_initializing: bool,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
}

/// Notifications published by the supervisor. Failures on the background
/// reconnect path are reported here instead of being returned to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Connected { generation: u64 },
    Disconnected { reason: String },
    RetryScheduled { attempt: u32, delay: Duration },
    ReconnectExhausted { attempts: u32 },
    HealthCheckFailed { reason: String },
}
