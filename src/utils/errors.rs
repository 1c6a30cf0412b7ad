use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("MCP client not ready")]
    NotReady,

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Message fragments that mean the transport underneath a call is gone.
const CONNECTION_FAULT_MARKERS: &[&str] = &[
    "not connected",
    "connection closed",
    "connection refused",
    "connection reset",
    "broken pipe",
    "transport closed",
    "session not found",
];

impl From<reqwest::Error> for McpError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest does not report which deadline expired
        if e.is_timeout() {
            McpError::TransportError(format!("request timed out: {}", e))
        } else if e.is_connect() {
            McpError::ConnectionError(e.to_string())
        } else {
            McpError::TransportError(e.to_string())
        }
    }
}

impl McpError {
    /// Whether this failure means the link itself is dead and a reconnect
    /// may help. Timeouts and backend-reported errors are not.
    pub fn is_connection_fault(&self) -> bool {
        match self {
            Self::ConnectionError(_) => true,
            Self::TransportError(msg) => {
                let msg = msg.to_lowercase();
                CONNECTION_FAULT_MARKERS.iter().any(|m| msg.contains(m))
            }
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
