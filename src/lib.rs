//! Cookie relay: an HTTP/JSON front door for an MCP server, holding one
//! self-healing client connection to it

pub mod cli;
pub mod config;
pub mod core;
pub mod http_server;
pub mod transport;
pub mod utils;

pub use config::Config;
pub use crate::core::{ConnectionSupervisor, Operation, RequestForwarder};
