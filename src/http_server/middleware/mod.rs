//! HTTP server middleware

pub mod cors;

pub use cors::{options_ok, relay_cors};
